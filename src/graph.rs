//! Resource Graph
//!
//! Records `parent → child` creation edges (Device → Buffer, Texture →
//! TextureView, ...) and cascades destruction down them.
//!
//! Cascade order is deterministic: post-order, children before their parent,
//! and among siblings the most recently created first. Any native library
//! that requires inverse-creation-order destruction is therefore satisfied.
//! A cascade that reaches a resource already destroyed on its own simply
//! does not find it any more, which keeps the operation idempotent.

use slotmap::SecondaryMap;
use smallvec::SmallVec;

use crate::errors::{Result, Subject, WardenError};
use crate::handle::ResourceKey;
use crate::resource::ResourceRef;
use crate::table::{DestroyCause, HandleTable, Tombstone};

#[derive(Debug, Default)]
struct Node {
    parent: Option<ResourceKey>,
    /// Creation order.
    children: SmallVec<[ResourceKey; 4]>,
}

/// Creation relationships between live resources.
#[derive(Debug, Default)]
pub struct ResourceGraph {
    nodes: SecondaryMap<ResourceKey, Node>,
}

impl ResourceGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a resource without a parent (a device).
    pub fn add_root(&mut self, table: &HandleTable, root: ResourceRef) -> Result<()> {
        table.get(root)?;
        self.nodes.insert(root.key(), Node::default());
        Ok(())
    }

    /// Records `child` as created from `parent`.
    ///
    /// Fails with [`WardenError::InvalidParent`] if the parent is no longer
    /// alive; creation should have been rejected before reaching this point.
    pub fn attach(
        &mut self,
        table: &HandleTable,
        parent: ResourceRef,
        child: ResourceRef,
    ) -> Result<()> {
        if !table.contains(parent) {
            let label = table
                .tombstone(parent.generation())
                .and_then(|tombstone| tombstone.label.clone());
            return Err(WardenError::InvalidParent {
                parent: Subject::new(parent.kind(), parent.generation(), label),
                child: child.kind(),
            });
        }
        table.get(child)?;

        if let Some(expected) = child.kind().parent_kind()
            && expected != parent.kind()
        {
            return Err(WardenError::KindMismatch {
                expected,
                found: parent.kind(),
            });
        }

        if !self.nodes.contains_key(parent.key()) {
            self.nodes.insert(parent.key(), Node::default());
        }
        if let Some(node) = self.nodes.get_mut(parent.key()) {
            node.children.push(child.key());
        }
        self.nodes.insert(
            child.key(),
            Node {
                parent: Some(parent.key()),
                children: SmallVec::new(),
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn parent(&self, key: ResourceKey) -> Option<ResourceKey> {
        self.nodes.get(key).and_then(|node| node.parent)
    }

    #[must_use]
    pub fn children(&self, key: ResourceKey) -> &[ResourceKey] {
        self.nodes.get(key).map_or(&[], |node| node.children.as_slice())
    }

    /// `root` and every transitive descendant, in cascade order (root last).
    #[must_use]
    pub fn destruction_order(&self, root: ResourceKey) -> Vec<ResourceKey> {
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];

        while let Some((key, expanded)) = stack.pop() {
            if expanded {
                order.push(key);
                continue;
            }
            stack.push((key, true));
            // Pushed in creation order, so the newest sibling is visited first.
            for &child in self.children(key) {
                stack.push((child, false));
            }
        }
        order
    }

    /// Transitive descendants of `root` in cascade order, excluding `root`.
    #[must_use]
    pub fn descendants(&self, root: ResourceKey) -> Vec<ResourceKey> {
        let mut order = self.destruction_order(root);
        order.pop();
        order
    }

    /// Removes `key` from the graph and from its parent's child list.
    pub fn detach(&mut self, key: ResourceKey) {
        let Some(node) = self.nodes.remove(key) else {
            return;
        };
        if let Some(parent) = node.parent
            && let Some(parent_node) = self.nodes.get_mut(parent)
        {
            parent_node.children.retain(|child| *child != key);
        }
    }

    /// Purges `root` and all of its descendants from `table`.
    ///
    /// Descendants are recorded with [`DestroyCause::Cascade`], the root with
    /// `root_cause`. Returns the tombstones in cascade order; an already
    /// destroyed `root` yields none.
    pub fn cascade_destroy(
        &mut self,
        table: &mut HandleTable,
        root: ResourceRef,
        root_cause: DestroyCause,
    ) -> Vec<Tombstone> {
        if !table.contains(root) {
            return Vec::new();
        }

        let order = self.destruction_order(root.key());
        let mut tombstones = Vec::with_capacity(order.len());
        for key in order {
            let cause = if key == root.key() {
                root_cause
            } else {
                DestroyCause::Cascade { root }
            };
            self.detach(key);
            if let Some(tombstone) = table.purge_key(key, cause) {
                tombstones.push(tombstone);
            }
        }
        tombstones
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
