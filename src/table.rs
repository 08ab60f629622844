//! Handle Table
//!
//! Maps native handle values to the managed [`Resource`] records and tracks
//! liveness. The table performs no native calls.
//!
//! # Invariants
//!
//! - At most one live resource per handle value ([`WardenError::DuplicateHandle`]
//!   otherwise).
//! - A purged resource leaves no handle mapping behind; its generation is kept
//!   in a [`Tombstone`] for diagnostics until the table is dropped.
//! - Generations are never reused, so a [`ResourceRef`] to a purged resource
//!   keeps failing with [`WardenError::ResourceDestroyed`] even after the native
//!   layer reuses the handle value for a new object.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::errors::{Result, Subject, WardenError};
use crate::handle::{Generation, Handle, ResourceKey, ResourceKind};
use crate::resource::{Resource, ResourceRef, ResourceSeed, ResourceState};

/// Why a resource left the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestroyCause {
    /// `destroy` was called on the resource itself.
    Explicit,
    /// An ancestor was destroyed.
    Cascade { root: ResourceRef },
    /// Released automatically once no longer needed (retired encoders).
    Released,
}

/// What remains of a purged resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tombstone {
    pub handle: Handle,
    pub kind: ResourceKind,
    pub generation: Generation,
    pub label: Option<String>,
    pub cause: DestroyCause,
}

impl Tombstone {
    #[must_use]
    pub fn subject(&self) -> Subject {
        Subject::new(self.kind, self.generation, self.label.clone())
    }
}

/// Registry of live native handles.
pub struct HandleTable {
    slots: SlotMap<ResourceKey, Resource>,
    by_handle: FxHashMap<Handle, ResourceKey>,
    tombstones: FxHashMap<Generation, Tombstone>,
    next_generation: Generation,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            by_handle: FxHashMap::default(),
            tombstones: FxHashMap::default(),
            next_generation: Generation::FIRST,
        }
    }

    /// Registers `handle` as a new resource of `kind` in its initial state.
    pub fn register(&mut self, handle: Handle, kind: ResourceKind) -> Result<ResourceRef> {
        self.insert(handle, ResourceSeed::new(kind))
    }

    /// Registers `handle` with the full creation record.
    pub fn insert(&mut self, handle: Handle, seed: ResourceSeed) -> Result<ResourceRef> {
        if let Some(&existing) = self.by_handle.get(&handle) {
            let kind = self.slots.get(existing).map_or(seed.kind(), Resource::kind);
            return Err(WardenError::DuplicateHandle { handle, kind });
        }

        let generation = self.next_generation;
        self.next_generation = generation.next();

        let key = self
            .slots
            .insert_with_key(|key| Resource::from_seed(key, handle, generation, seed));
        self.by_handle.insert(handle, key);

        let resource = &self.slots[key];
        log::trace!(
            "Registered {} {} with handle {}",
            resource.kind(),
            generation,
            handle
        );
        Ok(resource.to_ref())
    }

    /// Resolves a native handle to the live resource registered under it.
    pub fn lookup(&self, handle: Handle) -> Result<ResourceRef> {
        self.by_handle
            .get(&handle)
            .and_then(|&key| self.slots.get(key))
            .map(Resource::to_ref)
            .ok_or(WardenError::UnknownHandle(handle))
    }

    /// Resolves a reference, failing if its generation is no longer live.
    pub fn get(&self, resource: ResourceRef) -> Result<&Resource> {
        match self.slots.get(resource.key()) {
            Some(entry) if entry.generation() == resource.generation() => Ok(entry),
            _ => Err(self.destroyed(resource)),
        }
    }

    pub fn get_mut(&mut self, resource: ResourceRef) -> Result<&mut Resource> {
        let live = self
            .slots
            .get(resource.key())
            .is_some_and(|entry| entry.generation() == resource.generation());
        if !live {
            return Err(self.destroyed(resource));
        }
        Ok(&mut self.slots[resource.key()])
    }

    #[must_use]
    pub fn contains(&self, resource: ResourceRef) -> bool {
        self.get(resource).is_ok()
    }

    #[inline]
    pub(crate) fn by_key(&self, key: ResourceKey) -> Option<&Resource> {
        self.slots.get(key)
    }

    #[inline]
    pub(crate) fn by_key_mut(&mut self, key: ResourceKey) -> Option<&mut Resource> {
        self.slots.get_mut(key)
    }

    /// Removes a live resource, leaving a tombstone behind.
    pub fn purge(&mut self, resource: ResourceRef, cause: DestroyCause) -> Result<Tombstone> {
        self.get(resource)?;
        self.purge_key(resource.key(), cause)
            .ok_or_else(|| self.destroyed(resource))
    }

    pub(crate) fn purge_key(&mut self, key: ResourceKey, cause: DestroyCause) -> Option<Tombstone> {
        let mut entry = self.slots.remove(key)?;
        entry.set_state(ResourceState::Destroyed);

        if self.by_handle.get(&entry.handle()) == Some(&key) {
            self.by_handle.remove(&entry.handle());
        }

        let tombstone = Tombstone {
            handle: entry.handle(),
            kind: entry.kind(),
            generation: entry.generation(),
            label: entry.label().map(str::to_owned),
            cause,
        };
        log::trace!(
            "Purged {} {} (handle {}, {:?})",
            tombstone.kind,
            tombstone.generation,
            tombstone.handle,
            cause
        );
        self.tombstones.insert(tombstone.generation, tombstone.clone());
        Some(tombstone)
    }

    #[must_use]
    pub fn tombstone(&self, generation: Generation) -> Option<&Tombstone> {
        self.tombstones.get(&generation)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.slots.values()
    }

    fn destroyed(&self, resource: ResourceRef) -> WardenError {
        let subject = self.tombstones.get(&resource.generation()).map_or_else(
            || Subject::new(resource.kind(), resource.generation(), None),
            Tombstone::subject,
        );
        WardenError::ResourceDestroyed(subject)
    }
}
