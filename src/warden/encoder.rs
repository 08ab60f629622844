//! Command recording and submission.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use super::{native_failure, Registry, Warden};
use crate::errors::{Result, WardenError};
use crate::handle::Handle;
use crate::native::{NativeCommand, NativeDriver};
use crate::resource::{
    BufferId, CommandEncoderId, Extent3d, QueueId, ResourceDetail, ResourceRef, TextureId,
};
use crate::submission::SubmissionId;
use crate::validate::{Access, Operation};

/// One resource a command touches.
struct Use {
    target: ResourceRef,
    access: Access,
    range: Option<(u64, u64)>,
}

impl Use {
    fn new(target: impl Into<ResourceRef>, access: Access) -> Self {
        Self {
            target: target.into(),
            access,
            range: None,
        }
    }

    fn range(mut self, offset: u64, size: u64) -> Self {
        self.range = Some((offset, size));
        self
    }
}

impl<D: NativeDriver> Warden<D> {
    pub fn copy_buffer_to_buffer(
        &self,
        encoder: CommandEncoderId,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) -> Result<()> {
        if source == destination {
            return Err(WardenError::InvalidArgument(
                "copy source and destination must be different buffers".to_owned(),
            ));
        }
        let mut registry = self.registry.lock();
        let command = NativeCommand::CopyBufferToBuffer {
            source: registry.table.get(source.raw())?.handle(),
            source_offset,
            destination: registry.table.get(destination.raw())?.handle(),
            destination_offset,
            size,
        };
        self.record(
            &mut registry,
            encoder,
            &[
                Use::new(source, Access::CopySrc).range(source_offset, size),
                Use::new(destination, Access::CopyDst).range(destination_offset, size),
            ],
            Some(command),
        )
    }

    /// Copies buffer bytes into one mip level of a texture.
    ///
    /// Texture formats are not tracked, so the buffer side is only checked
    /// for `source_offset` lying inside the buffer. Whether the buffer holds
    /// enough bytes for `extent` is left to the native layer.
    pub fn copy_buffer_to_texture(
        &self,
        encoder: CommandEncoderId,
        source: BufferId,
        source_offset: u64,
        destination: TextureId,
        mip_level: u32,
        extent: Extent3d,
    ) -> Result<()> {
        let mut registry = self.registry.lock();
        check_texture_region(&registry, destination, mip_level, extent)?;
        let command = NativeCommand::CopyBufferToTexture {
            source: registry.table.get(source.raw())?.handle(),
            source_offset,
            destination: registry.table.get(destination.raw())?.handle(),
            mip_level,
            extent,
        };
        self.record(
            &mut registry,
            encoder,
            &[
                Use::new(source, Access::CopySrc).range(source_offset, 0),
                Use::new(destination, Access::CopyDst),
            ],
            Some(command),
        )
    }

    /// Copies one mip level of a texture into a buffer. The buffer side is
    /// checked like [`copy_buffer_to_texture`](Self::copy_buffer_to_texture).
    pub fn copy_texture_to_buffer(
        &self,
        encoder: CommandEncoderId,
        source: TextureId,
        mip_level: u32,
        destination: BufferId,
        destination_offset: u64,
        extent: Extent3d,
    ) -> Result<()> {
        let mut registry = self.registry.lock();
        check_texture_region(&registry, source, mip_level, extent)?;
        let command = NativeCommand::CopyTextureToBuffer {
            source: registry.table.get(source.raw())?.handle(),
            mip_level,
            destination: registry.table.get(destination.raw())?.handle(),
            destination_offset,
            extent,
        };
        self.record(
            &mut registry,
            encoder,
            &[
                Use::new(source, Access::CopySrc),
                Use::new(destination, Access::CopyDst).range(destination_offset, 0),
            ],
            Some(command),
        )
    }

    pub fn copy_texture_to_texture(
        &self,
        encoder: CommandEncoderId,
        source: TextureId,
        source_mip_level: u32,
        destination: TextureId,
        destination_mip_level: u32,
        extent: Extent3d,
    ) -> Result<()> {
        let mut registry = self.registry.lock();
        check_texture_region(&registry, source, source_mip_level, extent)?;
        check_texture_region(&registry, destination, destination_mip_level, extent)?;
        let command = NativeCommand::CopyTextureToTexture {
            source: registry.table.get(source.raw())?.handle(),
            source_mip_level,
            destination: registry.table.get(destination.raw())?.handle(),
            destination_mip_level,
            extent,
        };
        self.record(
            &mut registry,
            encoder,
            &[
                Use::new(source, Access::CopySrc),
                Use::new(destination, Access::CopyDst),
            ],
            Some(command),
        )
    }

    /// Zeroes `offset..offset + size` of a buffer. `None` clears to the end.
    pub fn clear_buffer(
        &self,
        encoder: CommandEncoderId,
        buffer: BufferId,
        offset: u64,
        size: Option<u64>,
    ) -> Result<()> {
        let mut registry = self.registry.lock();
        let entry = registry.table.get(buffer.raw())?;
        let size = size.unwrap_or_else(|| {
            entry
                .buffer_info()
                .map_or(0, |(buffer_size, _)| buffer_size.saturating_sub(offset))
        });
        let command = NativeCommand::ClearBuffer {
            buffer: entry.handle(),
            offset,
            size,
        };
        self.record(
            &mut registry,
            encoder,
            &[Use::new(buffer, Access::CopyDst).range(offset, size)],
            Some(command),
        )
    }

    /// Records that work encoded outside the warden (render or compute
    /// passes) uses `resources`, so submissions of `encoder` keep them alive.
    pub fn record_use(&self, encoder: CommandEncoderId, resources: &[ResourceRef]) -> Result<()> {
        let uses: Vec<Use> = resources
            .iter()
            .map(|&target| Use::new(target, Access::Any))
            .collect();
        let mut registry = self.registry.lock();
        self.record(&mut registry, encoder, &uses, None)
    }

    /// Ends recording. The encoder can then be submitted exactly once.
    pub fn finish(&self, encoder: CommandEncoderId) -> Result<()> {
        let mut registry = self.registry.lock();
        let transition = registry.check(&self.validator, encoder.raw(), Operation::Finish)?;
        let handle = registry.table.get(encoder.raw())?.handle();

        let command_buffer = self
            .driver
            .finish_encoder(handle)
            .map_err(native_failure("finish encoder"))?;

        registry.apply(encoder.raw(), transition)?;
        if let ResourceDetail::CommandEncoder {
            command_buffer: slot,
            ..
        } = registry.table.get_mut(encoder.raw())?.detail_mut()
        {
            *slot = Some(command_buffer);
        }
        Ok(())
    }

    /// Submits finished encoders in order.
    ///
    /// Every encoder must be `Ended`, and every resource its commands
    /// reference must still be alive and unmapped. On success the encoders
    /// and their referenced resources are held by the returned submission
    /// until the driver reports it done. An empty list submits nothing and
    /// returns `None`.
    pub fn submit(
        &self,
        queue: QueueId,
        encoders: &[CommandEncoderId],
    ) -> Result<Option<SubmissionId>> {
        if encoders.is_empty() {
            return Ok(None);
        }

        let mut guard = self.registry.lock();
        let registry = &mut *guard;
        let use_queue = Operation::Reference {
            access: Access::Any,
            range: None,
        };
        registry.check(&self.validator, queue.raw(), use_queue)?;

        let mut seen = FxHashSet::default();
        let mut members: Vec<ResourceRef> = Vec::new();
        let mut command_buffers: SmallVec<[Handle; 4]> = SmallVec::new();
        for &encoder in encoders {
            if !seen.insert(encoder) {
                return Err(WardenError::InvalidArgument(
                    "an encoder cannot be submitted twice in one call".to_owned(),
                ));
            }
            registry.check(&self.validator, encoder.raw(), Operation::Submit)?;
            registry.same_device(queue.raw(), encoder.raw())?;

            let ResourceDetail::CommandEncoder {
                command_buffer,
                referenced,
            } = registry.table.get(encoder.raw())?.detail()
            else {
                continue;
            };
            if let Some(command_buffer) = command_buffer {
                command_buffers.push(*command_buffer);
            }
            for &target in referenced {
                registry.check(&self.validator, target, use_queue)?;
                members.push(target);
            }
            members.push(encoder.raw());
        }

        let device = registry.device_key(queue.raw())?;
        let id = registry
            .submissions
            .begin(&registry.table, &members, Some(device))?;

        let queue_handle = registry.table.get(queue.raw())?.handle();
        if let Err(error) = self.driver.submit(queue_handle, &command_buffers, id) {
            // Nothing was queued natively; drop the references again.
            if let Err(rollback) = registry.submissions.retire(id) {
                log::warn!("Rollback of {id} failed: {rollback}");
            }
            return Err(native_failure("submit")(error));
        }

        for &encoder in encoders {
            let transition = registry.check(&self.validator, encoder.raw(), Operation::Submit)?;
            registry.apply(encoder.raw(), transition)?;
        }
        log::debug!(
            "Submitted {} encoder(s) as {id} on {}",
            encoders.len(),
            queue.generation()
        );
        Ok(Some(id))
    }

    fn record(
        &self,
        registry: &mut Registry,
        encoder: CommandEncoderId,
        uses: &[Use],
        command: Option<NativeCommand>,
    ) -> Result<()> {
        registry.check(&self.validator, encoder.raw(), Operation::Record)?;
        for resource in uses {
            let op = Operation::Reference {
                access: resource.access,
                range: resource.range,
            };
            registry.check(&self.validator, resource.target, op)?;
            registry.same_device(encoder.raw(), resource.target)?;
        }

        if let Some(command) = command {
            let handle = registry.table.get(encoder.raw())?.handle();
            self.driver
                .encode(handle, &command)
                .map_err(native_failure("encode"))?;
        }

        if let ResourceDetail::CommandEncoder { referenced, .. } =
            registry.table.get_mut(encoder.raw())?.detail_mut()
        {
            for resource in uses {
                if !referenced.contains(&resource.target) {
                    referenced.push(resource.target);
                }
            }
        }
        Ok(())
    }
}

/// Checks a copy region against the size of one mip level.
fn check_texture_region(
    registry: &Registry,
    texture: TextureId,
    mip_level: u32,
    extent: Extent3d,
) -> Result<()> {
    let entry = registry.table.get(texture.raw())?;
    let Some((size, mip_level_count, _)) = entry.texture_info() else {
        return Ok(());
    };
    if mip_level >= mip_level_count {
        return Err(WardenError::InvalidArgument(format!(
            "mip level {mip_level} of {} does not exist ({mip_level_count} levels)",
            entry.subject()
        )));
    }
    let width = (size.width >> mip_level).max(1);
    let height = (size.height >> mip_level).max(1);
    if extent.width > width
        || extent.height > height
        || extent.depth_or_array_layers > size.depth_or_array_layers
    {
        return Err(WardenError::InvalidArgument(format!(
            "copy extent {extent:?} exceeds mip level {mip_level} of {} ({width}x{height}x{})",
            entry.subject(),
            size.depth_or_array_layers
        )));
    }
    Ok(())
}
