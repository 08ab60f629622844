//! Resource creation.

use smallvec::SmallVec;

use super::{native_failure, Registry, Warden};
use crate::errors::{Result, WardenError};
use crate::handle::ResourceKind;
use crate::native::{NativeDescriptor, NativeDriver};
use crate::resource::descriptor::{is_plain_object, Label};
use crate::resource::{
    BufferDescriptor, BufferId, BufferState, CommandEncoderId, DeviceDescriptor, DeviceId,
    MapMode, MappedRange, ObjectDescriptor, QueueId, ResourceDetail, ResourceRef, ResourceSeed,
    ResourceState, TextureDescriptor, TextureId, TextureViewDescriptor, TextureViewId,
    COPY_BUFFER_ALIGNMENT,
};
use crate::validate::Operation;

impl<D: NativeDriver> Warden<D> {
    pub fn create_device(&self, descriptor: &DeviceDescriptor<'_>) -> Result<DeviceId> {
        let mut registry = self.registry.lock();
        let device = self.register_created(
            &mut registry,
            None,
            &NativeDescriptor::Device(descriptor),
            ResourceSeed::new(ResourceKind::Device)
                .with_label(descriptor.label)
                .with_detail(ResourceDetail::Device { queue: None }),
        )?;
        let device = DeviceId::from_raw(device);
        let handle = registry.table.get(device.raw())?.handle();
        self.driver.device_registered(handle, device);
        Ok(device)
    }

    /// The device's queue, created on first request.
    pub fn device_queue(&self, device: DeviceId) -> Result<QueueId> {
        let mut registry = self.registry.lock();
        let existing = match registry.table.get(device.raw())?.detail() {
            ResourceDetail::Device { queue } => *queue,
            _ => None,
        };
        if let Some(queue) = existing
            && registry.table.contains(queue)
        {
            // Fails once the device is lost, like every other use.
            registry.check(&self.validator, device.raw(), Operation::CreateChild)?;
            return Ok(QueueId::from_raw(queue));
        }

        let queue = self.register_created(
            &mut registry,
            Some(device.raw()),
            &NativeDescriptor::Queue,
            ResourceSeed::new(ResourceKind::Queue),
        )?;
        if let ResourceDetail::Device { queue: slot } =
            registry.table.get_mut(device.raw())?.detail_mut()
        {
            *slot = Some(queue);
        }
        Ok(QueueId::from_raw(queue))
    }

    pub fn create_buffer(
        &self,
        device: DeviceId,
        descriptor: &BufferDescriptor<'_>,
    ) -> Result<BufferId> {
        if descriptor.mapped_at_creation && descriptor.size % COPY_BUFFER_ALIGNMENT != 0 {
            return Err(WardenError::InvalidArgument(format!(
                "buffer mapped at creation must have a size multiple of {COPY_BUFFER_ALIGNMENT}, got {}",
                descriptor.size
            )));
        }

        let mut seed = ResourceSeed::new(ResourceKind::Buffer)
            .with_label(descriptor.label)
            .with_detail(ResourceDetail::Buffer {
                size: descriptor.size,
                usage: descriptor.usage,
            });
        if descriptor.mapped_at_creation {
            seed = seed.with_state(ResourceState::Buffer(BufferState::Mapped {
                mode: MapMode::WRITE,
                range: MappedRange::new(0, descriptor.size),
            }));
        }

        let mut registry = self.registry.lock();
        let buffer = self.register_created(
            &mut registry,
            Some(device.raw()),
            &NativeDescriptor::Buffer(descriptor),
            seed,
        )?;
        Ok(BufferId::from_raw(buffer))
    }

    pub fn create_texture(
        &self,
        device: DeviceId,
        descriptor: &TextureDescriptor<'_>,
    ) -> Result<TextureId> {
        let size = descriptor.size;
        if size.width == 0 || size.height == 0 || size.depth_or_array_layers == 0 {
            return Err(WardenError::InvalidArgument(format!(
                "texture extent must be non-zero, got {size:?}"
            )));
        }
        if descriptor.mip_level_count == 0 || descriptor.sample_count == 0 {
            return Err(WardenError::InvalidArgument(
                "texture mip level and sample counts must be at least 1".to_owned(),
            ));
        }

        let seed = ResourceSeed::new(ResourceKind::Texture)
            .with_label(descriptor.label)
            .with_detail(ResourceDetail::Texture {
                size,
                mip_level_count: descriptor.mip_level_count,
                usage: descriptor.usage,
            });

        let mut registry = self.registry.lock();
        let texture = self.register_created(
            &mut registry,
            Some(device.raw()),
            &NativeDescriptor::Texture(descriptor),
            seed,
        )?;
        Ok(TextureId::from_raw(texture))
    }

    pub fn create_texture_view(
        &self,
        texture: TextureId,
        descriptor: &TextureViewDescriptor<'_>,
    ) -> Result<TextureViewId> {
        let mut registry = self.registry.lock();
        if let Some((size, mip_level_count, _)) = registry.table.get(texture.raw())?.texture_info() {
            check_subrange(
                "mip level",
                descriptor.base_mip_level,
                descriptor.mip_level_count,
                mip_level_count,
            )?;
            check_subrange(
                "array layer",
                descriptor.base_array_layer,
                descriptor.array_layer_count,
                size.depth_or_array_layers,
            )?;
        }

        let view = self.register_created(
            &mut registry,
            Some(texture.raw()),
            &NativeDescriptor::TextureView(descriptor),
            ResourceSeed::new(ResourceKind::TextureView).with_label(descriptor.label),
        )?;
        Ok(TextureViewId::from_raw(view))
    }

    /// Creates a sampler, shader module, layout, bind group, pipeline or
    /// query set.
    pub fn create_object(
        &self,
        device: DeviceId,
        descriptor: &ObjectDescriptor<'_>,
    ) -> Result<ResourceRef> {
        if !is_plain_object(descriptor.kind) {
            return Err(WardenError::InvalidArgument(format!(
                "{} has a dedicated constructor",
                descriptor.kind
            )));
        }

        let mut registry = self.registry.lock();
        self.register_created(
            &mut registry,
            Some(device.raw()),
            &NativeDescriptor::Object(descriptor),
            ResourceSeed::new(descriptor.kind).with_label(descriptor.label),
        )
    }

    pub fn create_command_encoder(
        &self,
        device: DeviceId,
        label: Label<'_>,
    ) -> Result<CommandEncoderId> {
        let seed = ResourceSeed::new(ResourceKind::CommandEncoder)
            .with_label(label)
            .with_detail(ResourceDetail::CommandEncoder {
                command_buffer: None,
                referenced: SmallVec::new(),
            });

        let mut registry = self.registry.lock();
        let encoder = self.register_created(
            &mut registry,
            Some(device.raw()),
            &NativeDescriptor::CommandEncoder { label },
            seed,
        )?;
        Ok(CommandEncoderId::from_raw(encoder))
    }

    /// Validates the parent, creates the native object and records it.
    fn register_created(
        &self,
        registry: &mut Registry,
        parent: Option<ResourceRef>,
        descriptor: &NativeDescriptor<'_>,
        seed: ResourceSeed,
    ) -> Result<ResourceRef> {
        let kind = descriptor.kind();
        let (parent_handle, seed) = match parent {
            Some(parent) => {
                if kind.parent_kind() != Some(parent.kind()) {
                    return Err(WardenError::KindMismatch {
                        expected: kind.parent_kind().unwrap_or(parent.kind()),
                        found: parent.kind(),
                    });
                }
                registry.check(&self.validator, parent, Operation::CreateChild)?;
                let entry = registry.table.get(parent)?;
                (
                    Some(entry.handle()),
                    seed.with_device(entry.owning_device()),
                )
            }
            None => (None, seed),
        };

        let handle = self
            .driver
            .create(parent_handle, descriptor)
            .map_err(native_failure("create"))?;

        let resource = registry.table.insert(handle, seed).inspect_err(|err| {
            log::error!("Native layer returned a live handle for a new {kind}: {err}");
        })?;
        match parent {
            Some(parent) => registry.graph.attach(&registry.table, parent, resource)?,
            None => registry.graph.add_root(&registry.table, resource)?,
        }

        log::debug!(
            "Created {} {}{}",
            kind,
            resource.generation(),
            descriptor
                .label()
                .map(|label| format!(" '{label}'"))
                .unwrap_or_default()
        );
        Ok(resource)
    }
}

/// Validates a `[base, base + count)` sub-range of `available` items. A
/// missing count extends to the end.
fn check_subrange(what: &str, base: u32, count: Option<u32>, available: u32) -> Result<()> {
    if base >= available {
        return Err(WardenError::InvalidArgument(format!(
            "base {what} {base} exceeds the {available} available"
        )));
    }
    match count {
        Some(0) => Err(WardenError::InvalidArgument(format!(
            "{what} count must be at least 1"
        ))),
        Some(count) if base.checked_add(count).is_none_or(|end| end > available) => {
            Err(WardenError::InvalidArgument(format!(
                "{what} range {base}..+{count} exceeds the {available} available"
            )))
        }
        _ => Ok(()),
    }
}
