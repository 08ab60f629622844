//! Lookups and diagnostics. None of these reach the driver.

use rustc_hash::FxHashMap;

use super::Warden;
use crate::errors::Result;
use crate::handle::{Handle, ResourceKind};
use crate::native::NativeDriver;
use crate::resource::{BufferId, BufferMapState, Resource, ResourceRef, ResourceState};
use crate::table::Tombstone;

/// Snapshot of what a warden currently tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WardenStats {
    pub live: usize,
    pub by_kind: FxHashMap<ResourceKind, usize>,
    pub pending_submissions: usize,
    pub tombstones: usize,
}

impl WardenStats {
    /// Live resources of one kind.
    #[must_use]
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

impl<D: NativeDriver> Warden<D> {
    /// Resolves a native handle to the live resource registered under it.
    pub fn lookup(&self, handle: Handle) -> Result<ResourceRef> {
        self.registry.lock().table.lookup(handle)
    }

    pub fn state(&self, resource: impl Into<ResourceRef>) -> Result<ResourceState> {
        Ok(self.registry.lock().table.get(resource.into())?.state())
    }

    pub fn buffer_map_state(&self, buffer: BufferId) -> Result<BufferMapState> {
        match self.state(buffer)? {
            ResourceState::Buffer(state) => Ok(state.map_state()),
            _ => Ok(BufferMapState::Unmapped),
        }
    }

    pub fn label(&self, resource: impl Into<ResourceRef>) -> Result<Option<String>> {
        Ok(self
            .registry
            .lock()
            .table
            .get(resource.into())?
            .label()
            .map(str::to_owned))
    }

    #[must_use]
    pub fn is_alive(&self, resource: impl Into<ResourceRef>) -> bool {
        self.registry.lock().table.contains(resource.into())
    }

    /// Number of unretired submissions referencing `resource`.
    pub fn in_flight(&self, resource: impl Into<ResourceRef>) -> Result<u32> {
        let resource = resource.into();
        let registry = self.registry.lock();
        registry.table.get(resource)?;
        Ok(registry.submissions.in_flight(resource.key()))
    }

    /// Resources created directly from `resource`, oldest first.
    pub fn children(&self, resource: impl Into<ResourceRef>) -> Result<Vec<ResourceRef>> {
        let resource = resource.into();
        let registry = self.registry.lock();
        registry.table.get(resource)?;
        Ok(registry
            .graph
            .children(resource.key())
            .iter()
            .filter_map(|&key| registry.table.by_key(key))
            .map(Resource::to_ref)
            .collect())
    }

    pub fn parent(&self, resource: impl Into<ResourceRef>) -> Result<Option<ResourceRef>> {
        let resource = resource.into();
        let registry = self.registry.lock();
        registry.table.get(resource)?;
        Ok(registry
            .graph
            .parent(resource.key())
            .and_then(|key| registry.table.by_key(key))
            .map(Resource::to_ref))
    }

    /// What remains of a destroyed resource. `None` while it is alive.
    #[must_use]
    pub fn tombstone(&self, resource: impl Into<ResourceRef>) -> Option<Tombstone> {
        self.registry
            .lock()
            .table
            .tombstone(resource.into().generation())
            .cloned()
    }

    #[must_use]
    pub fn stats(&self) -> WardenStats {
        let registry = self.registry.lock();
        let mut by_kind = FxHashMap::default();
        for resource in registry.table.iter() {
            *by_kind.entry(resource.kind()).or_insert(0) += 1;
        }
        WardenStats {
            live: registry.table.len(),
            by_kind,
            pending_submissions: registry.submissions.pending(),
            tombstones: registry.table.tombstone_count(),
        }
    }
}
