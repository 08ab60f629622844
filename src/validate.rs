//! Usage Validator
//!
//! One decision point for every state-changing request. [`UsageValidator::check_transition`]
//! is pure: it inspects a resource and the surrounding context and answers
//! either with the [`Transition`] to apply or with the [`Violation`] that
//! forbids the request. Callers consult it before issuing the matching native
//! call and must not issue that call when it fails.
//!
//! # State machines
//!
//! | Kind           | Transitions                                                      |
//! |----------------|------------------------------------------------------------------|
//! | Buffer         | `Unmapped → MapPending → Mapped → Unmapped`, any `→ Destroyed`   |
//! | Device         | `Active → Lost → Destroyed`                                      |
//! | CommandEncoder | `Recording → Ended → Submitted`, any `→ Destroyed`               |
//! | others         | `Ready → Destroyed`                                              |
//!
//! Checks run in a fixed order: destroyed, device lost, in-flight references,
//! then kind-specific state and argument rules.

use crate::errors::{Subject, WardenError};
use crate::handle::ResourceKind;
use crate::resource::{
    BufferState, BufferUsages, DeviceState, EncoderState, MapMode, MappedRange, Resource,
    ResourceState, TextureUsages, COPY_BUFFER_ALIGNMENT, MAP_ALIGNMENT,
};

/// How a referenced resource is accessed by recorded GPU work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Bound by pass work; only liveness and mapping state matter.
    Any,
    CopySrc,
    CopyDst,
}

/// A request the validator decides on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Destroy,
    CreateChild,
    MapAsync {
        mode: MapMode,
        offset: u64,
        size: u64,
    },
    CompleteMap {
        success: bool,
    },
    Unmap,
    ReadMapped {
        offset: u64,
        size: u64,
    },
    WriteMapped {
        offset: u64,
        size: u64,
    },
    /// Use by encoder commands or by a submission. `range` applies to buffers.
    Reference {
        access: Access,
        range: Option<(u64, u64)>,
    },
    QueueWrite {
        offset: u64,
        size: u64,
    },
    Record,
    Finish,
    Submit,
    MarkLost,
}

impl Operation {
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Destroy => "destroy",
            Self::CreateChild => "create a child of",
            Self::MapAsync { .. } => "map",
            Self::CompleteMap { .. } => "complete the mapping of",
            Self::Unmap => "unmap",
            Self::ReadMapped { .. } => "read the mapped range of",
            Self::WriteMapped { .. } => "write the mapped range of",
            Self::Reference { .. } => "reference",
            Self::QueueWrite { .. } => "write",
            Self::Record => "record into",
            Self::Finish => "finish",
            Self::Submit => "submit",
            Self::MarkLost => "mark lost",
        }
    }
}

/// Context the validator cannot read from the resource itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransitionContext {
    /// Unretired submissions referencing the resource.
    pub in_flight: u32,
    /// Whether the owning device is lost.
    pub device_lost: bool,
}

/// Outcome of a permitted request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Keep,
    Enter(ResourceState),
}

impl Transition {
    #[must_use]
    pub fn apply_to(self, current: ResourceState) -> ResourceState {
        match self {
            Self::Keep => current,
            Self::Enter(next) => next,
        }
    }
}

/// Why a request is refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    WrongState { state: &'static str },
    ResourceDestroyed,
    DeviceLost,
    InFlightReference { submissions: u32 },
    InvalidEncoderState { state: EncoderState },
    MissingUsage { required: String },
    OutOfBounds { offset: u64, size: u64, limit: u64 },
    Misaligned { value: u64, alignment: u64 },
    InvalidArgument(String),
}

impl Violation {
    /// Attaches the resource and operation the violation was found for.
    #[must_use]
    pub fn into_error(self, subject: Subject, op: Operation) -> WardenError {
        let op = op.verb();
        match self {
            Self::WrongState { state } => WardenError::WrongState { subject, op, state },
            Self::ResourceDestroyed => WardenError::ResourceDestroyed(subject),
            Self::DeviceLost => WardenError::DeviceLost(subject),
            Self::InFlightReference { submissions } => WardenError::InFlightReference {
                subject,
                op,
                submissions,
            },
            Self::InvalidEncoderState { state } => {
                WardenError::InvalidEncoderState { subject, op, state }
            }
            Self::MissingUsage { required } => WardenError::MissingUsage { subject, required },
            Self::OutOfBounds {
                offset,
                size,
                limit,
            } => WardenError::OutOfBounds {
                subject,
                offset,
                size,
                limit,
            },
            Self::Misaligned { value, alignment } => WardenError::Misaligned {
                subject,
                value,
                alignment,
            },
            Self::InvalidArgument(message) => {
                WardenError::InvalidArgument(format!("{message} ({subject})"))
            }
        }
    }
}

type Verdict = std::result::Result<Transition, Violation>;

/// Per-kind transition rules.
#[derive(Clone, Copy, Debug)]
pub struct UsageValidator {
    enforce_alignment: bool,
}

impl Default for UsageValidator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl UsageValidator {
    #[must_use]
    pub fn new(enforce_alignment: bool) -> Self {
        Self { enforce_alignment }
    }

    /// Decides whether `op` may be applied to `resource`.
    pub fn check_transition(
        &self,
        resource: &Resource,
        op: Operation,
        ctx: TransitionContext,
    ) -> Verdict {
        let state = resource.state();
        if state.is_destroyed() {
            return Err(Violation::ResourceDestroyed);
        }

        // A lost device may still be destroyed or marked lost again; nothing
        // else goes through.
        let device_op = resource.kind() == ResourceKind::Device
            && matches!(op, Operation::Destroy | Operation::MarkLost);
        if ctx.device_lost && !device_op {
            return Err(Violation::DeviceLost);
        }

        match op {
            Operation::MarkLost => match state {
                ResourceState::Device(DeviceState::Active) => {
                    Ok(Transition::Enter(ResourceState::Device(DeviceState::Lost)))
                }
                ResourceState::Device(DeviceState::Lost) => Ok(Transition::Keep),
                _ => Err(wrong_state(state)),
            },
            Operation::Destroy => check_destroy(resource, ctx),
            Operation::CreateChild => Ok(Transition::Keep),
            Operation::MapAsync { mode, offset, size } => {
                self.check_map(resource, ctx, mode, offset, size)
            }
            Operation::CompleteMap { success } => check_complete_map(state, success),
            Operation::Unmap => match state {
                ResourceState::Buffer(BufferState::Mapped { .. } | BufferState::MapPending { .. }) => {
                    Ok(Transition::Enter(ResourceState::Buffer(BufferState::Unmapped)))
                }
                _ => Err(wrong_state(state)),
            },
            Operation::ReadMapped { offset, size } => {
                check_mapped_access(state, MapMode::READ, offset, size)
            }
            Operation::WriteMapped { offset, size } => {
                check_mapped_access(state, MapMode::WRITE, offset, size)
            }
            Operation::Reference { access, range } => self.check_reference(resource, access, range),
            Operation::QueueWrite { offset, size } => self.check_queue_write(resource, offset, size),
            Operation::Record => match state {
                ResourceState::CommandEncoder(EncoderState::Recording) => Ok(Transition::Keep),
                _ => Err(encoder_violation(state)),
            },
            Operation::Finish => match state {
                ResourceState::CommandEncoder(EncoderState::Recording) => Ok(Transition::Enter(
                    ResourceState::CommandEncoder(EncoderState::Ended),
                )),
                _ => Err(encoder_violation(state)),
            },
            Operation::Submit => match state {
                ResourceState::CommandEncoder(EncoderState::Ended) => Ok(Transition::Enter(
                    ResourceState::CommandEncoder(EncoderState::Submitted),
                )),
                _ => Err(encoder_violation(state)),
            },
        }
    }

    fn check_map(
        &self,
        resource: &Resource,
        ctx: TransitionContext,
        mode: MapMode,
        offset: u64,
        size: u64,
    ) -> Verdict {
        let Some((buffer_size, usage)) = resource.buffer_info() else {
            return Err(wrong_state(resource.state()));
        };
        if ctx.in_flight > 0 {
            return Err(Violation::InFlightReference {
                submissions: ctx.in_flight,
            });
        }
        if resource.state() != ResourceState::Buffer(BufferState::Unmapped) {
            return Err(wrong_state(resource.state()));
        }
        if mode != MapMode::READ && mode != MapMode::WRITE {
            return Err(Violation::InvalidArgument(format!(
                "map mode must be exactly READ or WRITE, got {mode:?}"
            )));
        }
        require_buffer_usage(usage, mode.required_usage())?;
        check_range(offset, size, buffer_size)?;
        if self.enforce_alignment {
            check_alignment(offset, MAP_ALIGNMENT)?;
            check_alignment(size, COPY_BUFFER_ALIGNMENT)?;
        }

        let range = MappedRange::new(offset, size);
        Ok(Transition::Enter(ResourceState::Buffer(
            BufferState::MapPending { mode, range },
        )))
    }

    fn check_reference(
        &self,
        resource: &Resource,
        access: Access,
        range: Option<(u64, u64)>,
    ) -> Verdict {
        match resource.kind() {
            ResourceKind::Buffer => {
                let state = resource.state();
                if state != ResourceState::Buffer(BufferState::Unmapped) {
                    return Err(wrong_state(state));
                }
                let Some((buffer_size, usage)) = resource.buffer_info() else {
                    return Ok(Transition::Keep);
                };
                match access {
                    Access::Any => {}
                    Access::CopySrc => require_buffer_usage(usage, BufferUsages::COPY_SRC)?,
                    Access::CopyDst => require_buffer_usage(usage, BufferUsages::COPY_DST)?,
                }
                if let Some((offset, size)) = range {
                    check_range(offset, size, buffer_size)?;
                    if self.enforce_alignment {
                        check_alignment(offset, COPY_BUFFER_ALIGNMENT)?;
                        check_alignment(size, COPY_BUFFER_ALIGNMENT)?;
                    }
                }
                Ok(Transition::Keep)
            }
            ResourceKind::Texture => {
                if let Some((_, _, usage)) = resource.texture_info() {
                    let required = match access {
                        Access::Any => TextureUsages::empty(),
                        Access::CopySrc => TextureUsages::COPY_SRC,
                        Access::CopyDst => TextureUsages::COPY_DST,
                    };
                    if !usage.contains(required) {
                        return Err(Violation::MissingUsage {
                            required: format!("{required:?}"),
                        });
                    }
                }
                Ok(Transition::Keep)
            }
            ResourceKind::Device => Err(wrong_state(resource.state())),
            _ => Ok(Transition::Keep),
        }
    }

    fn check_queue_write(&self, resource: &Resource, offset: u64, size: u64) -> Verdict {
        let Some((buffer_size, usage)) = resource.buffer_info() else {
            return Err(wrong_state(resource.state()));
        };
        if resource.state() != ResourceState::Buffer(BufferState::Unmapped) {
            return Err(wrong_state(resource.state()));
        }
        require_buffer_usage(usage, BufferUsages::COPY_DST)?;
        check_range(offset, size, buffer_size)?;
        if self.enforce_alignment {
            check_alignment(offset, COPY_BUFFER_ALIGNMENT)?;
            check_alignment(size, COPY_BUFFER_ALIGNMENT)?;
        }
        Ok(Transition::Keep)
    }
}

fn check_destroy(resource: &Resource, ctx: TransitionContext) -> Verdict {
    if resource.kind() == ResourceKind::Queue {
        return Err(Violation::WrongState {
            state: "owned by its device",
        });
    }
    if ctx.in_flight > 0 {
        return Err(Violation::InFlightReference {
            submissions: ctx.in_flight,
        });
    }
    Ok(Transition::Enter(ResourceState::Destroyed))
}

fn check_complete_map(state: ResourceState, success: bool) -> Verdict {
    match state {
        ResourceState::Buffer(BufferState::MapPending { mode, range }) => {
            let next = if success {
                BufferState::Mapped { mode, range }
            } else {
                BufferState::Unmapped
            };
            Ok(Transition::Enter(ResourceState::Buffer(next)))
        }
        _ => Err(wrong_state(state)),
    }
}

fn check_mapped_access(state: ResourceState, needed: MapMode, offset: u64, size: u64) -> Verdict {
    let ResourceState::Buffer(BufferState::Mapped { mode, range }) = state else {
        return Err(wrong_state(state));
    };
    if !mode.contains(needed) {
        return Err(Violation::WrongState {
            state: if needed == MapMode::READ {
                "mapped without READ access"
            } else {
                "mapped without WRITE access"
            },
        });
    }
    if !range.contains(offset, size) {
        return Err(Violation::OutOfBounds {
            offset,
            size,
            limit: range.end(),
        });
    }
    Ok(Transition::Keep)
}

fn require_buffer_usage(
    usage: BufferUsages,
    required: BufferUsages,
) -> std::result::Result<(), Violation> {
    if usage.contains(required) {
        Ok(())
    } else {
        Err(Violation::MissingUsage {
            required: format!("{:?}", required.difference(usage)),
        })
    }
}

fn check_range(offset: u64, size: u64, limit: u64) -> std::result::Result<(), Violation> {
    match offset.checked_add(size) {
        Some(end) if end <= limit => Ok(()),
        _ => Err(Violation::OutOfBounds {
            offset,
            size,
            limit,
        }),
    }
}

fn check_alignment(value: u64, alignment: u64) -> std::result::Result<(), Violation> {
    if value % alignment == 0 {
        Ok(())
    } else {
        Err(Violation::Misaligned { value, alignment })
    }
}

fn wrong_state(state: ResourceState) -> Violation {
    Violation::WrongState { state: state.name() }
}

fn encoder_violation(state: ResourceState) -> Violation {
    match state {
        ResourceState::CommandEncoder(state) => Violation::InvalidEncoderState { state },
        other => wrong_state(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;
    use crate::resource::{ResourceDetail, ResourceRef, ResourceSeed};
    use crate::table::HandleTable;

    fn buffer(table: &mut HandleTable, usage: BufferUsages) -> ResourceRef {
        let seed = ResourceSeed::new(ResourceKind::Buffer)
            .with_detail(ResourceDetail::Buffer { size: 256, usage });
        let raw = 0x1000 + table.len() * 0x10;
        table.insert(Handle::new(raw).unwrap(), seed).unwrap()
    }

    fn idle() -> TransitionContext {
        TransitionContext::default()
    }

    #[test]
    fn map_enters_pending_state() {
        let mut table = HandleTable::new();
        let b = buffer(&mut table, BufferUsages::MAP_READ);
        let validator = UsageValidator::default();

        let op = Operation::MapAsync {
            mode: MapMode::READ,
            offset: 0,
            size: 64,
        };
        let verdict = validator.check_transition(table.get(b).unwrap(), op, idle());
        assert_eq!(
            verdict,
            Ok(Transition::Enter(ResourceState::Buffer(
                BufferState::MapPending {
                    mode: MapMode::READ,
                    range: MappedRange::new(0, 64),
                }
            )))
        );
    }

    #[test]
    fn map_refused_while_in_flight() {
        let mut table = HandleTable::new();
        let b = buffer(&mut table, BufferUsages::MAP_WRITE);
        let ctx = TransitionContext {
            in_flight: 2,
            device_lost: false,
        };
        let op = Operation::MapAsync {
            mode: MapMode::WRITE,
            offset: 0,
            size: 256,
        };

        assert_eq!(
            UsageValidator::default().check_transition(table.get(b).unwrap(), op, ctx),
            Err(Violation::InFlightReference { submissions: 2 })
        );
    }

    #[test]
    fn map_requires_usage_bounds_and_alignment() {
        let mut table = HandleTable::new();
        let b = buffer(&mut table, BufferUsages::MAP_READ);
        let validator = UsageValidator::default();
        let entry = table.get(b).unwrap();

        let write = Operation::MapAsync {
            mode: MapMode::WRITE,
            offset: 0,
            size: 16,
        };
        assert!(matches!(
            validator.check_transition(entry, write, idle()),
            Err(Violation::MissingUsage { .. })
        ));

        let too_far = Operation::MapAsync {
            mode: MapMode::READ,
            offset: 128,
            size: 256,
        };
        assert!(matches!(
            validator.check_transition(entry, too_far, idle()),
            Err(Violation::OutOfBounds { limit: 256, .. })
        ));

        let misaligned = Operation::MapAsync {
            mode: MapMode::READ,
            offset: 4,
            size: 16,
        };
        assert_eq!(
            validator.check_transition(entry, misaligned, idle()),
            Err(Violation::Misaligned {
                value: 4,
                alignment: MAP_ALIGNMENT,
            })
        );
        assert!(
            UsageValidator::new(false)
                .check_transition(entry, misaligned, idle())
                .is_ok()
        );
    }

    #[test]
    fn destroy_refused_while_in_flight() {
        let mut table = HandleTable::new();
        let b = buffer(&mut table, BufferUsages::COPY_DST);
        let ctx = TransitionContext {
            in_flight: 1,
            device_lost: false,
        };

        assert_eq!(
            UsageValidator::default().check_transition(table.get(b).unwrap(), Operation::Destroy, ctx),
            Err(Violation::InFlightReference { submissions: 1 })
        );
    }

    #[test]
    fn device_loss_blocks_everything_but_device_destroy() {
        let mut table = HandleTable::new();
        let device = table
            .register(Handle::new(0x10).unwrap(), ResourceKind::Device)
            .unwrap();
        let b = buffer(&mut table, BufferUsages::COPY_DST);
        let lost = TransitionContext {
            in_flight: 0,
            device_lost: true,
        };
        let validator = UsageValidator::default();

        assert_eq!(
            validator.check_transition(table.get(b).unwrap(), Operation::Destroy, lost),
            Err(Violation::DeviceLost)
        );
        assert_eq!(
            validator.check_transition(table.get(device).unwrap(), Operation::CreateChild, lost),
            Err(Violation::DeviceLost)
        );
        assert_eq!(
            validator.check_transition(table.get(device).unwrap(), Operation::Destroy, lost),
            Ok(Transition::Enter(ResourceState::Destroyed))
        );
    }

    #[test]
    fn marking_lost_is_sticky_and_device_only() {
        let mut table = HandleTable::new();
        let device = table
            .register(Handle::new(0x10).unwrap(), ResourceKind::Device)
            .unwrap();
        let b = buffer(&mut table, BufferUsages::COPY_DST);
        let validator = UsageValidator::default();

        assert_eq!(
            validator.check_transition(table.get(device).unwrap(), Operation::MarkLost, idle()),
            Ok(Transition::Enter(ResourceState::Device(DeviceState::Lost)))
        );

        let entry = table.get_mut(device).unwrap();
        entry.set_state(ResourceState::Device(DeviceState::Lost));
        let lost = TransitionContext {
            in_flight: 0,
            device_lost: true,
        };
        assert_eq!(
            validator.check_transition(table.get(device).unwrap(), Operation::MarkLost, lost),
            Ok(Transition::Keep)
        );
        assert_eq!(
            validator.check_transition(table.get(b).unwrap(), Operation::MarkLost, idle()),
            Err(Violation::WrongState { state: "Unmapped" })
        );
    }

    #[test]
    fn encoder_walks_recording_ended_submitted() {
        let mut table = HandleTable::new();
        let encoder = table
            .register(Handle::new(0x20).unwrap(), ResourceKind::CommandEncoder)
            .unwrap();
        let validator = UsageValidator::default();

        let finish = validator
            .check_transition(table.get(encoder).unwrap(), Operation::Finish, idle())
            .unwrap();
        let entry = table.get_mut(encoder).unwrap();
        entry.set_state(finish.apply_to(entry.state()));

        let entry = table.get(encoder).unwrap();
        assert_eq!(
            validator.check_transition(entry, Operation::Finish, idle()),
            Err(Violation::InvalidEncoderState {
                state: EncoderState::Ended,
            })
        );
        assert_eq!(
            validator.check_transition(entry, Operation::Record, idle()),
            Err(Violation::InvalidEncoderState {
                state: EncoderState::Ended,
            })
        );
        assert_eq!(
            validator.check_transition(entry, Operation::Submit, idle()),
            Ok(Transition::Enter(ResourceState::CommandEncoder(
                EncoderState::Submitted
            )))
        );
    }

    #[test]
    fn mapped_buffer_cannot_be_referenced() {
        let mut table = HandleTable::new();
        let b = buffer(&mut table, BufferUsages::MAP_WRITE | BufferUsages::COPY_SRC);
        table
            .get_mut(b)
            .unwrap()
            .set_state(ResourceState::Buffer(BufferState::Mapped {
                mode: MapMode::WRITE,
                range: MappedRange::new(0, 256),
            }));

        let op = Operation::Reference {
            access: Access::CopySrc,
            range: Some((0, 16)),
        };
        assert_eq!(
            UsageValidator::default().check_transition(table.get(b).unwrap(), op, idle()),
            Err(Violation::WrongState { state: "Mapped" })
        );
    }

    #[test]
    fn mapped_access_respects_mode_and_range() {
        let mut table = HandleTable::new();
        let b = buffer(&mut table, BufferUsages::MAP_READ);
        table
            .get_mut(b)
            .unwrap()
            .set_state(ResourceState::Buffer(BufferState::Mapped {
                mode: MapMode::READ,
                range: MappedRange::new(64, 64),
            }));
        let validator = UsageValidator::default();
        let entry = table.get(b).unwrap();

        assert!(
            validator
                .check_transition(entry, Operation::ReadMapped { offset: 64, size: 64 }, idle())
                .is_ok()
        );
        assert!(matches!(
            validator.check_transition(entry, Operation::ReadMapped { offset: 0, size: 8 }, idle()),
            Err(Violation::OutOfBounds { .. })
        ));
        assert!(matches!(
            validator.check_transition(entry, Operation::WriteMapped { offset: 64, size: 8 }, idle()),
            Err(Violation::WrongState { .. })
        ));
    }

    #[test]
    fn queue_cannot_be_destroyed_alone() {
        let mut table = HandleTable::new();
        let queue = table
            .register(Handle::new(0x30).unwrap(), ResourceKind::Queue)
            .unwrap();

        assert!(matches!(
            UsageValidator::default().check_transition(table.get(queue).unwrap(), Operation::Destroy, idle()),
            Err(Violation::WrongState { .. })
        ));
    }
}
