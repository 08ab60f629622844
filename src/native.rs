//! Native Driver Seam
//!
//! Everything the tracking core needs from the native graphics library is
//! expressed through [`NativeDriver`]. An implementation wraps the raw
//! foreign calls (webgpu.h or similar) and translates their status codes into
//! [`NativeError`]; the core never interprets those codes.
//!
//! Completion signals reach the core in two ways:
//!
//! - [`NativeDriver::poll`] is called once per active device by
//!   [`Warden::poll_completions`](crate::Warden::poll_completions) and returns
//!   whatever completed since the last poll.
//! - Native callbacks that fire on other threads push a [`DriverEvent`] into an
//!   [`EventSender`], which never blocks and never takes the tracking lock.

use crate::errors::NativeError;
use crate::handle::{Handle, ResourceKind};
use crate::logging::NativeLogLevel;
use crate::resource::descriptor::Label;
use crate::resource::{
    BufferDescriptor, BufferId, DeviceDescriptor, DeviceId, Extent3d, MapMode, MappedRange,
    ObjectDescriptor, TextureDescriptor, TextureViewDescriptor,
};
use crate::submission::SubmissionId;

pub type NativeResult<T> = std::result::Result<T, NativeError>;

// ============================================================================
// Requests
// ============================================================================

/// Creation request forwarded to the driver.
#[derive(Clone, Copy, Debug)]
pub enum NativeDescriptor<'a> {
    Device(&'a DeviceDescriptor<'a>),
    /// The device's queue. Created once per device.
    Queue,
    Buffer(&'a BufferDescriptor<'a>),
    Texture(&'a TextureDescriptor<'a>),
    TextureView(&'a TextureViewDescriptor<'a>),
    CommandEncoder { label: Label<'a> },
    Object(&'a ObjectDescriptor<'a>),
}

impl NativeDescriptor<'_> {
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Device(_) => ResourceKind::Device,
            Self::Queue => ResourceKind::Queue,
            Self::Buffer(_) => ResourceKind::Buffer,
            Self::Texture(_) => ResourceKind::Texture,
            Self::TextureView(_) => ResourceKind::TextureView,
            Self::CommandEncoder { .. } => ResourceKind::CommandEncoder,
            Self::Object(desc) => desc.kind,
        }
    }

    #[must_use]
    pub fn label(&self) -> Label<'_> {
        match self {
            Self::Device(desc) => desc.label,
            Self::Queue => None,
            Self::Buffer(desc) => desc.label,
            Self::Texture(desc) => desc.label,
            Self::TextureView(desc) => desc.label,
            Self::CommandEncoder { label } => *label,
            Self::Object(desc) => desc.label,
        }
    }
}

/// Command recorded into a native command encoder.
///
/// Only handles cross this boundary; validation has already happened.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NativeCommand {
    CopyBufferToBuffer {
        source: Handle,
        source_offset: u64,
        destination: Handle,
        destination_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        source: Handle,
        source_offset: u64,
        destination: Handle,
        mip_level: u32,
        extent: Extent3d,
    },
    CopyTextureToBuffer {
        source: Handle,
        mip_level: u32,
        destination: Handle,
        destination_offset: u64,
        extent: Extent3d,
    },
    CopyTextureToTexture {
        source: Handle,
        source_mip_level: u32,
        destination: Handle,
        destination_mip_level: u32,
        extent: Extent3d,
    },
    ClearBuffer {
        buffer: Handle,
        offset: u64,
        size: u64,
    },
}

/// Immediate answer of a map request.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MapStatus {
    /// The range is mapped on return.
    Ready,
    /// Completion arrives later as [`DriverEvent::MapCompleted`].
    Pending,
}

/// Status delivered by the native map callback.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MapAsyncStatus {
    Success,
    InstanceDropped,
    Error,
    Aborted,
    Unknown,
}

impl MapAsyncStatus {
    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Names one map request of one buffer.
///
/// Handed to [`NativeDriver::map_buffer`] and carried back unchanged by the
/// matching [`DriverEvent::MapCompleted`]. A completion whose buffer was
/// destroyed, or whose request was superseded by a later one, is recognised
/// as stale even when the native handle value has since been reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MapToken {
    buffer: BufferId,
    request: u64,
}

impl MapToken {
    pub(crate) fn new(buffer: BufferId, request: u64) -> Self {
        Self { buffer, request }
    }

    #[inline]
    #[must_use]
    pub fn buffer(self) -> BufferId {
        self.buffer
    }

    #[inline]
    #[must_use]
    pub fn request(self) -> u64 {
        self.request
    }
}

// ============================================================================
// Events
// ============================================================================

/// Asynchronous signal from the native layer.
///
/// Events name their subject by generation-tagged token, never by raw handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverEvent {
    /// The GPU finished the work of a submission.
    WorkDone(SubmissionId),
    /// A pending map request resolved.
    MapCompleted {
        request: MapToken,
        status: MapAsyncStatus,
    },
    /// The device reported loss. `device` is the id the driver received in
    /// [`NativeDriver::device_registered`].
    DeviceLost { device: DeviceId, reason: String },
}

/// Cloneable sending half of the facade's event queue.
#[derive(Clone, Debug)]
pub struct EventSender {
    inner: flume::Sender<DriverEvent>,
}

impl EventSender {
    pub(crate) fn new(inner: flume::Sender<DriverEvent>) -> Self {
        Self { inner }
    }

    /// Queues an event for the next
    /// [`poll_completions`](crate::Warden::poll_completions).
    ///
    /// Returns `false` if the facade has been dropped.
    pub fn send(&self, event: DriverEvent) -> bool {
        match self.inner.send(event) {
            Ok(()) => true,
            Err(flume::SendError(event)) => {
                log::debug!("Dropping {event:?}: event queue closed");
                false
            }
        }
    }
}

// ============================================================================
// NativeDriver
// ============================================================================

/// Fallible foreign calls the tracking core forwards to.
///
/// Every method is called with the tracking lock held, after validation has
/// passed. Implementations must not call back into the facade; asynchronous
/// results go through [`poll`](Self::poll) or an [`EventSender`].
pub trait NativeDriver: Send + Sync {
    /// Creates an object. `parent` is the handle of the device (or texture,
    /// for views) it is created from.
    fn create(&self, parent: Option<Handle>, descriptor: &NativeDescriptor<'_>)
    -> NativeResult<Handle>;

    /// Destroys an object the application asked to destroy.
    fn destroy(&self, kind: ResourceKind, handle: Handle) -> NativeResult<()>;

    /// Releases an object removed as a side effect (cascade, retired encoder).
    /// Failures are logged and otherwise ignored.
    fn release(&self, kind: ResourceKind, handle: Handle) -> NativeResult<()> {
        self.destroy(kind, handle)
    }

    /// Called once a newly created device is tracked. Loss of that device
    /// must be reported as [`DriverEvent::DeviceLost`] carrying `device`.
    fn device_registered(&self, handle: Handle, device: DeviceId) {
        let _ = (handle, device);
    }

    /// Requests a mapping. When the answer is [`MapStatus::Pending`] the
    /// completion must be reported as [`DriverEvent::MapCompleted`] carrying
    /// `request`.
    fn map_buffer(
        &self,
        buffer: Handle,
        mode: MapMode,
        range: MappedRange,
        request: MapToken,
    ) -> NativeResult<MapStatus>;

    /// Unmaps the buffer, aborting a pending map request.
    fn unmap_buffer(&self, buffer: Handle) -> NativeResult<()>;

    /// Copies `data.len()` bytes out of the mapped range starting at `offset`.
    fn read_mapped(&self, buffer: Handle, offset: u64, data: &mut [u8]) -> NativeResult<()>;

    /// Copies `data` into the mapped range starting at `offset`.
    fn write_mapped(&self, buffer: Handle, offset: u64, data: &[u8]) -> NativeResult<()>;

    /// Queue-ordered write into a buffer.
    fn write_buffer(
        &self,
        queue: Handle,
        buffer: Handle,
        offset: u64,
        data: &[u8],
    ) -> NativeResult<()>;

    fn encode(&self, encoder: Handle, command: &NativeCommand) -> NativeResult<()>;

    /// Ends recording and returns the command buffer handle.
    fn finish_encoder(&self, encoder: Handle) -> NativeResult<Handle>;

    /// Submits command buffers in order. Completion must later be reported as
    /// [`DriverEvent::WorkDone`] carrying `token`.
    fn submit(
        &self,
        queue: Handle,
        command_buffers: &[Handle],
        token: SubmissionId,
    ) -> NativeResult<()>;

    /// Non-blocking poll of one device.
    fn poll(&self, device: Handle) -> Vec<DriverEvent>;

    /// Adjusts the native library's log verbosity.
    fn set_log_level(&self, level: NativeLogLevel) {
        let _ = level;
    }
}
