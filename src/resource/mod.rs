//! Tracked Resources
//!
//! A [`Resource`] is the managed record behind one live native handle: its
//! kind, lifecycle state, generation, owning device and kind-specific detail.
//! Applications never hold a `Resource` directly; they hold a [`ResourceRef`]
//! (or one of the typed ids), a `Copy` value carrying the generation it was
//! issued for so that use after destruction is detected instead of silently
//! resolving to whatever the native layer later put behind the same handle.

pub mod descriptor;
mod ids;
pub mod state;

use smallvec::SmallVec;

use crate::errors::Subject;
use crate::handle::{Generation, Handle, ResourceKey, ResourceKind};

pub use descriptor::{
    BufferDescriptor, BufferUsages, DeviceDescriptor, Extent3d, MapMode, ObjectDescriptor,
    PowerPreference, TextureDescriptor, TextureUsages, TextureViewDescriptor,
    COPY_BUFFER_ALIGNMENT, MAP_ALIGNMENT,
};
pub use ids::{BufferId, CommandEncoderId, DeviceId, QueueId, TextureId, TextureViewId};
pub use state::{
    BufferMapState, BufferState, DeviceState, EncoderState, MappedRange, ResourceState,
};

// ============================================================================
// ResourceRef
// ============================================================================

/// Generation-tagged reference to a tracked resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ResourceRef {
    key: ResourceKey,
    generation: Generation,
    kind: ResourceKind,
}

impl ResourceRef {
    pub(crate) fn new(key: ResourceKey, generation: Generation, kind: ResourceKind) -> Self {
        Self {
            key,
            generation,
            kind,
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

// ============================================================================
// ResourceDetail
// ============================================================================

/// Kind-specific data fixed at creation or accumulated during recording.
#[derive(Clone, Debug, Default)]
pub enum ResourceDetail {
    #[default]
    None,
    Device {
        queue: Option<ResourceRef>,
    },
    Buffer {
        size: u64,
        usage: BufferUsages,
    },
    Texture {
        size: Extent3d,
        mip_level_count: u32,
        usage: TextureUsages,
    },
    CommandEncoder {
        /// Native command buffer produced by `finish`.
        command_buffer: Option<Handle>,
        /// Resources referenced by recorded commands, in first-use order.
        referenced: SmallVec<[ResourceRef; 8]>,
    },
}

// ============================================================================
// Resource
// ============================================================================

/// Managed record of one registered native handle.
#[derive(Clone, Debug)]
pub struct Resource {
    key: ResourceKey,
    handle: Handle,
    kind: ResourceKind,
    generation: Generation,
    state: ResourceState,
    label: Option<String>,
    device: Option<ResourceKey>,
    detail: ResourceDetail,
}

impl Resource {
    pub(crate) fn from_seed(
        key: ResourceKey,
        handle: Handle,
        generation: Generation,
        seed: ResourceSeed,
    ) -> Self {
        Self {
            key,
            handle,
            kind: seed.kind,
            generation,
            state: seed.state.unwrap_or_else(|| ResourceState::initial(seed.kind)),
            label: seed.label,
            device: seed.device,
            detail: seed.detail,
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.state
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[must_use]
    pub fn detail(&self) -> &ResourceDetail {
        &self.detail
    }

    /// Key of the device this resource was created under. A device owns itself.
    #[must_use]
    pub fn owning_device(&self) -> ResourceKey {
        self.device.unwrap_or(self.key)
    }

    #[must_use]
    pub fn to_ref(&self) -> ResourceRef {
        ResourceRef::new(self.key, self.generation, self.kind)
    }

    #[must_use]
    pub fn subject(&self) -> Subject {
        Subject::new(self.kind, self.generation, self.label.clone())
    }

    /// Size and usage of a buffer.
    #[must_use]
    pub fn buffer_info(&self) -> Option<(u64, BufferUsages)> {
        match self.detail {
            ResourceDetail::Buffer { size, usage } => Some((size, usage)),
            _ => None,
        }
    }

    #[must_use]
    pub fn texture_info(&self) -> Option<(Extent3d, u32, TextureUsages)> {
        match self.detail {
            ResourceDetail::Texture {
                size,
                mip_level_count,
                usage,
            } => Some((size, mip_level_count, usage)),
            _ => None,
        }
    }

    pub(crate) fn set_state(&mut self, state: ResourceState) {
        self.state = state;
    }

    pub(crate) fn detail_mut(&mut self) -> &mut ResourceDetail {
        &mut self.detail
    }
}

// ============================================================================
// ResourceSeed
// ============================================================================

/// Everything needed to register a new resource besides its handle.
#[derive(Clone, Debug)]
pub struct ResourceSeed {
    kind: ResourceKind,
    label: Option<String>,
    device: Option<ResourceKey>,
    detail: ResourceDetail,
    state: Option<ResourceState>,
}

impl ResourceSeed {
    #[must_use]
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            label: None,
            device: None,
            detail: ResourceDetail::None,
            state: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[must_use]
    pub fn with_label(mut self, label: Option<&str>) -> Self {
        self.label = label.map(str::to_owned);
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: ResourceKey) -> Self {
        self.device = Some(device);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: ResourceDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Overrides the kind's initial state.
    #[must_use]
    pub fn with_state(mut self, state: ResourceState) -> Self {
        self.state = Some(state);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_range_containment() {
        let range = MappedRange::new(16, 32);
        assert!(range.contains(16, 32));
        assert!(range.contains(20, 4));
        assert!(!range.contains(8, 16));
        assert!(!range.contains(40, 16));
        assert!(!range.contains(u64::MAX, 2));
    }

    #[test]
    fn initial_states_follow_kind() {
        assert_eq!(
            ResourceState::initial(ResourceKind::Buffer),
            ResourceState::Buffer(BufferState::Unmapped)
        );
        assert_eq!(
            ResourceState::initial(ResourceKind::Device),
            ResourceState::Device(DeviceState::Active)
        );
        assert_eq!(
            ResourceState::initial(ResourceKind::CommandEncoder),
            ResourceState::CommandEncoder(EncoderState::Recording)
        );
        assert_eq!(ResourceState::initial(ResourceKind::Sampler), ResourceState::Ready);
    }

    #[test]
    fn map_mode_requires_matching_usage() {
        assert_eq!(MapMode::READ.required_usage(), BufferUsages::MAP_READ);
        assert_eq!(
            (MapMode::READ | MapMode::WRITE).required_usage(),
            BufferUsages::MAP_READ | BufferUsages::MAP_WRITE
        );
    }
}
