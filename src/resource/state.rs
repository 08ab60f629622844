//! Per-kind lifecycle states.

use std::fmt;

use crate::handle::ResourceKind;
use crate::resource::descriptor::MapMode;

/// Byte range of a buffer mapping.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MappedRange {
    pub offset: u64,
    pub size: u64,
}

impl MappedRange {
    #[inline]
    #[must_use]
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    #[inline]
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    /// Whether `[offset, offset + size)` lies inside this range.
    #[must_use]
    pub fn contains(&self, offset: u64, size: u64) -> bool {
        offset >= self.offset
            && offset
                .checked_add(size)
                .is_some_and(|end| end <= self.end())
    }
}

/// Buffer mapping state machine.
///
/// `Unmapped → MapPending → Mapped → Unmapped`; the driver may also complete a
/// map request synchronously, skipping `MapPending`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BufferState {
    Unmapped,
    MapPending { mode: MapMode, range: MappedRange },
    Mapped { mode: MapMode, range: MappedRange },
}

impl BufferState {
    /// The native-facing summary of this state.
    #[must_use]
    pub fn map_state(&self) -> BufferMapState {
        match self {
            Self::Unmapped => BufferMapState::Unmapped,
            Self::MapPending { .. } => BufferMapState::Pending,
            Self::Mapped { .. } => BufferMapState::Mapped,
        }
    }
}

/// Coarse mapping state as reported by the native `GetMapState` query.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BufferMapState {
    Unmapped,
    Pending,
    Mapped,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DeviceState {
    Active,
    /// Terminal native condition. Sticky until the device is destroyed.
    Lost,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EncoderState {
    Recording,
    Ended,
    /// Consumed by exactly one submission.
    Submitted,
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Recording => "Recording",
            Self::Ended => "Ended",
            Self::Submitted => "Submitted",
        })
    }
}

/// Lifecycle state of a tracked resource.
///
/// Kinds without a state machine of their own sit in `Ready` until destroyed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResourceState {
    Device(DeviceState),
    Buffer(BufferState),
    CommandEncoder(EncoderState),
    Ready,
    Destroyed,
}

impl ResourceState {
    /// State a freshly registered resource of `kind` starts in.
    #[must_use]
    pub fn initial(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Device => Self::Device(DeviceState::Active),
            ResourceKind::Buffer => Self::Buffer(BufferState::Unmapped),
            ResourceKind::CommandEncoder => Self::CommandEncoder(EncoderState::Recording),
            _ => Self::Ready,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Device(DeviceState::Active) => "Active",
            Self::Device(DeviceState::Lost) => "Lost",
            Self::Buffer(BufferState::Unmapped) => "Unmapped",
            Self::Buffer(BufferState::MapPending { .. }) => "MapPending",
            Self::Buffer(BufferState::Mapped { .. }) => "Mapped",
            Self::CommandEncoder(EncoderState::Recording) => "Recording",
            Self::CommandEncoder(EncoderState::Ended) => "Ended",
            Self::CommandEncoder(EncoderState::Submitted) => "Submitted",
            Self::Ready => "Ready",
            Self::Destroyed => "Destroyed",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
