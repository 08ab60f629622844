//! Native Handles & Resource Identity
//!
//! The native layer identifies GPU objects by address-sized integers with no
//! ownership semantics. This module defines the value types the tracking core
//! builds on:
//!
//! - [`Handle`]: the raw native identifier, never null
//! - [`Generation`]: a process-wide, never-reused tag assigned at registration
//! - [`ResourceKind`]: which kind of GPU object a handle refers to
//! - [`ResourceKey`]: slot key into the handle table's storage

use std::fmt;
use std::num::NonZeroUsize;

use slotmap::new_key_type;

new_key_type! {
    /// Storage key of a registered resource.
    ///
    /// Keys are versioned by `slotmap`, so a key to a purged slot never
    /// resolves to a later occupant of the same slot.
    pub struct ResourceKey;
}

// ============================================================================
// Handle
// ============================================================================

/// Opaque native identifier for a GPU object.
///
/// The native library may hand out the same value again once the previous
/// object has been released, so a `Handle` alone never identifies a resource
/// across time. Pair it with a [`Generation`] for that.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(NonZeroUsize);

impl Handle {
    /// Wraps a raw native value. Returns `None` for the null handle.
    #[inline]
    #[must_use]
    pub fn new(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    /// The raw address-sized value.
    #[inline]
    #[must_use]
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl From<NonZeroUsize> for Handle {
    fn from(raw: NonZeroUsize) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Monotonic registration tag.
///
/// Every registration receives a fresh generation from its table; values are
/// never handed out twice, which lets a stale [`ResourceRef`](crate::ResourceRef)
/// detect that the resource it names has been destroyed even when the native
/// handle value has since been reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Generation(u64);

impl Generation {
    pub(crate) const FIRST: Self = Self(1);

    #[inline]
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// ResourceKind
// ============================================================================

/// Kind of GPU object behind a handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum ResourceKind {
    Device,
    Queue,
    Buffer,
    Texture,
    TextureView,
    Sampler,
    ShaderModule,
    BindGroupLayout,
    BindGroup,
    PipelineLayout,
    RenderPipeline,
    ComputePipeline,
    CommandEncoder,
    QuerySet,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 14] = [
        Self::Device,
        Self::Queue,
        Self::Buffer,
        Self::Texture,
        Self::TextureView,
        Self::Sampler,
        Self::ShaderModule,
        Self::BindGroupLayout,
        Self::BindGroup,
        Self::PipelineLayout,
        Self::RenderPipeline,
        Self::ComputePipeline,
        Self::CommandEncoder,
        Self::QuerySet,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Device => "Device",
            Self::Queue => "Queue",
            Self::Buffer => "Buffer",
            Self::Texture => "Texture",
            Self::TextureView => "TextureView",
            Self::Sampler => "Sampler",
            Self::ShaderModule => "ShaderModule",
            Self::BindGroupLayout => "BindGroupLayout",
            Self::BindGroup => "BindGroup",
            Self::PipelineLayout => "PipelineLayout",
            Self::RenderPipeline => "RenderPipeline",
            Self::ComputePipeline => "ComputePipeline",
            Self::CommandEncoder => "CommandEncoder",
            Self::QuerySet => "QuerySet",
        }
    }

    /// The kind a resource of this kind must be created from.
    ///
    /// `None` marks a root kind.
    #[must_use]
    pub const fn parent_kind(self) -> Option<ResourceKind> {
        match self {
            Self::Device => None,
            Self::TextureView => Some(Self::Texture),
            _ => Some(Self::Device),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle_is_rejected() {
        assert!(Handle::new(0).is_none());
        assert_eq!(Handle::new(0x1000).map(Handle::get), Some(0x1000));
    }

    #[test]
    fn handle_formats_as_hex() {
        let handle = Handle::new(0xdead_beef).unwrap();
        assert_eq!(format!("{handle}"), "0xdeadbeef");
        assert_eq!(format!("{handle:?}"), "Handle(0xdeadbeef)");
    }

    #[test]
    fn only_devices_are_roots() {
        for kind in ResourceKind::ALL {
            match kind {
                ResourceKind::Device => assert_eq!(kind.parent_kind(), None),
                ResourceKind::TextureView => {
                    assert_eq!(kind.parent_kind(), Some(ResourceKind::Texture));
                }
                _ => assert_eq!(kind.parent_kind(), Some(ResourceKind::Device)),
            }
        }
    }
}
