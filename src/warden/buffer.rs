//! Buffer mapping and queue writes.

use super::{native_failure, Warden};
use crate::errors::Result;
use crate::native::{MapStatus, MapToken, NativeDriver};
use crate::resource::{BufferId, BufferState, MapMode, MappedRange, QueueId, ResourceState};
use crate::validate::{Access, Operation, Transition};

impl<D: NativeDriver> Warden<D> {
    /// Requests CPU access to `offset..offset + size` of a buffer. `None`
    /// maps to the end of the buffer.
    ///
    /// Fails with [`InFlightReference`](crate::WardenError::InFlightReference)
    /// while any unretired submission references the buffer. When the driver
    /// answers [`MapStatus::Pending`] the buffer stays `MapPending` until a
    /// [`MapCompleted`](crate::DriverEvent::MapCompleted) event carrying the
    /// request's [`MapToken`] arrives.
    pub fn map_buffer(
        &self,
        buffer: BufferId,
        mode: MapMode,
        offset: u64,
        size: Option<u64>,
    ) -> Result<MapStatus> {
        let mut registry = self.registry.lock();
        let entry = registry.table.get(buffer.raw())?;
        let size = size.unwrap_or_else(|| {
            entry
                .buffer_info()
                .map_or(0, |(buffer_size, _)| buffer_size.saturating_sub(offset))
        });
        let handle = entry.handle();

        let op = Operation::MapAsync { mode, offset, size };
        let transition = registry.check(&self.validator, buffer.raw(), op)?;

        let range = MappedRange::new(offset, size);
        let request = MapToken::new(buffer, registry.next_map_request());
        let status = self
            .driver
            .map_buffer(handle, mode, range, request)
            .map_err(native_failure("map"))?;

        let transition = match status {
            MapStatus::Ready => {
                Transition::Enter(ResourceState::Buffer(BufferState::Mapped { mode, range }))
            }
            MapStatus::Pending => {
                registry
                    .map_requests
                    .insert(buffer.raw().key(), request.request());
                transition
            }
        };
        registry.apply(buffer.raw(), transition)?;
        log::debug!("Mapped buffer {} ({status:?})", buffer.generation());
        Ok(status)
    }

    /// Ends CPU access, aborting a pending map request.
    pub fn unmap(&self, buffer: BufferId) -> Result<()> {
        let mut registry = self.registry.lock();
        let transition = registry.check(&self.validator, buffer.raw(), Operation::Unmap)?;
        let handle = registry.table.get(buffer.raw())?.handle();

        self.driver
            .unmap_buffer(handle)
            .map_err(native_failure("unmap"))?;
        registry.map_requests.remove(buffer.raw().key());
        registry.apply(buffer.raw(), transition)
    }

    /// Copies bytes out of the mapped range.
    pub fn read_mapped(&self, buffer: BufferId, offset: u64, data: &mut [u8]) -> Result<()> {
        let registry = self.registry.lock();
        let op = Operation::ReadMapped {
            offset,
            size: data.len() as u64,
        };
        registry.check(&self.validator, buffer.raw(), op)?;
        let handle = registry.table.get(buffer.raw())?.handle();

        self.driver
            .read_mapped(handle, offset, data)
            .map_err(native_failure("read mapped range"))
    }

    /// Copies bytes into the mapped range.
    pub fn write_mapped(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        let registry = self.registry.lock();
        let op = Operation::WriteMapped {
            offset,
            size: data.len() as u64,
        };
        registry.check(&self.validator, buffer.raw(), op)?;
        let handle = registry.table.get(buffer.raw())?.handle();

        self.driver
            .write_mapped(handle, offset, data)
            .map_err(native_failure("write mapped range"))
    }

    /// Schedules a write of `data` into `buffer` on the queue's timeline.
    ///
    /// Allowed while the buffer is referenced by in-flight submissions; the
    /// native queue orders the write after them.
    pub fn write_buffer(
        &self,
        queue: QueueId,
        buffer: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        let registry = self.registry.lock();
        let use_queue = Operation::Reference {
            access: Access::Any,
            range: None,
        };
        registry.check(&self.validator, queue.raw(), use_queue)?;
        let op = Operation::QueueWrite {
            offset,
            size: data.len() as u64,
        };
        registry.check(&self.validator, buffer.raw(), op)?;
        registry.same_device(queue.raw(), buffer.raw())?;

        let queue_handle = registry.table.get(queue.raw())?.handle();
        let buffer_handle = registry.table.get(buffer.raw())?.handle();
        self.driver
            .write_buffer(queue_handle, buffer_handle, offset, data)
            .map_err(native_failure("write buffer"))
    }
}
