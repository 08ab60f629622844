#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! # gpu-warden
//!
//! A resource lifetime and validation layer for native graphics handles.
//!
//! Native GPU libraries hand out raw handles with manual lifetimes, strict
//! creation and destruction ordering and usage rules they do not enforce
//! across a foreign-function boundary. The [`Warden`] reconstructs those rules:
//!
//! - every live handle maps to exactly one tracked [`Resource`], and stale
//!   references are detected through generations even after handle reuse
//! - destroying a parent cascades to everything created from it
//! - buffers referenced by in-flight submissions cannot be mapped or destroyed
//! - once a device is lost, nothing derived from it reaches the driver again
//!
//! The native library itself sits behind the [`NativeDriver`] trait.
//!
//! ```rust,ignore
//! use gpu_warden::{BufferDescriptor, BufferUsages, DeviceDescriptor, MapMode, Warden};
//!
//! let warden = Warden::with_defaults(driver);
//! let device = warden.create_device(&DeviceDescriptor::default())?;
//! let buffer = warden.create_buffer(device, &BufferDescriptor {
//!     size: 256,
//!     usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
//!     ..Default::default()
//! })?;
//!
//! let encoder = warden.create_command_encoder(device, Some("upload"))?;
//! warden.clear_buffer(encoder, buffer, 0, None)?;
//! warden.finish(encoder)?;
//! let queue = warden.device_queue(device)?;
//! warden.submit(queue, &[encoder])?;
//!
//! // Rejected with InFlightReference until the driver reports completion.
//! while warden.map_buffer(buffer, MapMode::READ, 0, None).is_err() {
//!     warden.poll_completions();
//! }
//! ```

pub mod config;
pub mod errors;
pub mod graph;
pub mod handle;
pub mod logging;
pub mod native;
pub mod resource;
pub mod submission;
pub mod table;
pub mod validate;
pub mod warden;

pub use config::WardenConfig;
pub use errors::{NativeError, Result, Subject, WardenError};
pub use graph::ResourceGraph;
pub use handle::{Generation, Handle, ResourceKey, ResourceKind};
pub use logging::{forward_native_log, NativeLogLevel};
pub use native::{
    DriverEvent, EventSender, MapAsyncStatus, MapStatus, MapToken, NativeCommand,
    NativeDescriptor, NativeDriver, NativeResult,
};
pub use resource::{
    BufferDescriptor, BufferId, BufferMapState, BufferState, BufferUsages, CommandEncoderId,
    DeviceDescriptor, DeviceId, DeviceState, EncoderState, Extent3d, MapMode, MappedRange,
    ObjectDescriptor, PowerPreference, QueueId, Resource, ResourceRef, ResourceSeed,
    ResourceState, TextureDescriptor, TextureId, TextureUsages, TextureViewDescriptor,
    TextureViewId, COPY_BUFFER_ALIGNMENT, MAP_ALIGNMENT,
};
pub use submission::{SubmissionId, SubmissionTracker};
pub use table::{DestroyCause, HandleTable, Tombstone};
pub use validate::{Access, Operation, Transition, TransitionContext, UsageValidator, Violation};
pub use warden::{PollSummary, Warden, WardenStats};
