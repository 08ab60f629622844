//! Creation descriptors and usage flags.
//!
//! Bit values follow the webgpu.h header so drivers can pass them straight
//! through to the native call.

use bitflags::bitflags;

use crate::handle::ResourceKind;

/// Required alignment of a buffer map offset.
pub const MAP_ALIGNMENT: u64 = 8;
/// Required alignment of buffer copy offsets and sizes.
pub const COPY_BUFFER_ALIGNMENT: u64 = 4;

pub type Label<'a> = Option<&'a str>;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct BufferUsages: u64 {
        const MAP_READ = 0x0001;
        const MAP_WRITE = 0x0002;
        const COPY_SRC = 0x0004;
        const COPY_DST = 0x0008;
        const INDEX = 0x0010;
        const VERTEX = 0x0020;
        const UNIFORM = 0x0040;
        const STORAGE = 0x0080;
        const INDIRECT = 0x0100;
        const QUERY_RESOLVE = 0x0200;
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct TextureUsages: u64 {
        const COPY_SRC = 0x01;
        const COPY_DST = 0x02;
        const TEXTURE_BINDING = 0x04;
        const STORAGE_BINDING = 0x08;
        const RENDER_ATTACHMENT = 0x10;
    }
}

bitflags! {
    /// CPU access requested by a buffer map.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct MapMode: u64 {
        const READ = 0x1;
        const WRITE = 0x2;
    }
}

impl MapMode {
    /// Buffer usage a mapping in this mode requires.
    #[must_use]
    pub fn required_usage(self) -> BufferUsages {
        let mut usage = BufferUsages::empty();
        if self.contains(Self::READ) {
            usage |= BufferUsages::MAP_READ;
        }
        if self.contains(Self::WRITE) {
            usage |= BufferUsages::MAP_WRITE;
        }
        usage
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum PowerPreference {
    #[default]
    Undefined,
    LowPower,
    HighPerformance,
}

#[derive(Clone, Debug, Default)]
pub struct DeviceDescriptor<'a> {
    pub label: Label<'a>,
    pub power_preference: PowerPreference,
}

#[derive(Clone, Debug, Default)]
pub struct BufferDescriptor<'a> {
    pub label: Label<'a>,
    pub size: u64,
    pub usage: BufferUsages,
    /// Starts the buffer in the mapped-for-write state.
    pub mapped_at_creation: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth_or_array_layers: u32,
}

impl Default for Extent3d {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TextureDescriptor<'a> {
    pub label: Label<'a>,
    pub size: Extent3d,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub usage: TextureUsages,
}

impl Default for TextureDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            size: Extent3d::default(),
            mip_level_count: 1,
            sample_count: 1,
            usage: TextureUsages::empty(),
        }
    }
}

/// View over a sub-range of a texture. `None` counts mean "to the end".
#[derive(Clone, Debug, Default)]
pub struct TextureViewDescriptor<'a> {
    pub label: Label<'a>,
    pub base_mip_level: u32,
    pub mip_level_count: Option<u32>,
    pub base_array_layer: u32,
    pub array_layer_count: Option<u32>,
}

/// Creation descriptor for kinds whose lifetime is all the core tracks:
/// samplers, shader modules, layouts, bind groups, pipelines and query sets.
#[derive(Clone, Debug)]
pub struct ObjectDescriptor<'a> {
    pub kind: ResourceKind,
    pub label: Label<'a>,
}

impl<'a> ObjectDescriptor<'a> {
    #[must_use]
    pub fn new(kind: ResourceKind, label: Label<'a>) -> Self {
        Self { kind, label }
    }
}

/// Whether `kind` can be created through [`ObjectDescriptor`].
#[must_use]
pub fn is_plain_object(kind: ResourceKind) -> bool {
    matches!(
        kind,
        ResourceKind::Sampler
            | ResourceKind::ShaderModule
            | ResourceKind::BindGroupLayout
            | ResourceKind::BindGroup
            | ResourceKind::PipelineLayout
            | ResourceKind::RenderPipeline
            | ResourceKind::ComputePipeline
            | ResourceKind::QuerySet
    )
}
