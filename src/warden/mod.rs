//! Warden Facade
//!
//! [`Warden`] is the entry point applications call. It composes the handle
//! table, resource graph, usage validator and submission tracker around one
//! [`NativeDriver`], and every mutating method follows the same protocol:
//!
//! 1. resolve the generation-tagged references,
//! 2. ask the [`UsageValidator`] whether the request is allowed,
//! 3. perform the native call,
//! 4. update tracking state only once the native call succeeded.
//!
//! All tracking state lives behind a single lock held across all four steps,
//! so concurrent callers observe cascades and reference-count changes
//! atomically. Native completion callbacks never take that lock; they queue
//! [`DriverEvent`]s which [`Warden::poll_completions`] applies.
//!
//! The methods are split across submodules by concern:
//!
//! - `create`: devices, queues, buffers, textures, views, encoders, objects
//! - `destroy`: explicit and cascading destruction
//! - `buffer`: mapping, mapped-range access, queue writes
//! - `encoder`: command recording, `finish` and `submit`
//! - `events`: completion processing and device loss
//! - `query`: lookups and diagnostics

mod buffer;
mod create;
mod destroy;
mod encoder;
mod events;
mod query;

use parking_lot::Mutex;
use slotmap::SecondaryMap;

use crate::config::WardenConfig;
use crate::errors::{NativeError, Result, WardenError};
use crate::graph::ResourceGraph;
use crate::handle::ResourceKey;
use crate::native::{DriverEvent, EventSender, NativeDriver};
use crate::resource::{DeviceState, Resource, ResourceRef, ResourceState};
use crate::submission::SubmissionTracker;
use crate::table::HandleTable;
use crate::validate::{Operation, Transition, TransitionContext, UsageValidator};

pub use events::PollSummary;
pub use query::WardenStats;

// ============================================================================
// Registry
// ============================================================================

/// Tracking state guarded by the facade lock.
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) table: HandleTable,
    pub(crate) graph: ResourceGraph,
    pub(crate) submissions: SubmissionTracker,
    /// Outstanding map request per `MapPending` buffer.
    pub(crate) map_requests: SecondaryMap<ResourceKey, u64>,
    next_map_request: u64,
}

impl Registry {
    fn next_map_request(&mut self) -> u64 {
        self.next_map_request += 1;
        self.next_map_request
    }

    fn is_device_lost(&self, resource: &Resource) -> bool {
        self.table
            .by_key(resource.owning_device())
            .is_some_and(|device| device.state() == ResourceState::Device(DeviceState::Lost))
    }

    fn context(&self, resource: &Resource) -> TransitionContext {
        TransitionContext {
            in_flight: self.submissions.in_flight(resource.key()),
            device_lost: self.is_device_lost(resource),
        }
    }

    /// Runs the validator for `op` on `target`.
    fn check(
        &self,
        validator: &UsageValidator,
        target: ResourceRef,
        op: Operation,
    ) -> Result<Transition> {
        let resource = self.table.get(target)?;
        validator
            .check_transition(resource, op, self.context(resource))
            .map_err(|violation| violation.into_error(resource.subject(), op))
    }

    fn apply(&mut self, target: ResourceRef, transition: Transition) -> Result<()> {
        let resource = self.table.get_mut(target)?;
        let next = transition.apply_to(resource.state());
        if next != resource.state() {
            log::trace!(
                "{} {} {} -> {}",
                resource.kind(),
                resource.generation(),
                resource.state(),
                next
            );
            resource.set_state(next);
        }
        Ok(())
    }

    /// Fails with [`WardenError::InvalidArgument`] unless both resources were
    /// created under the same device.
    fn same_device(&self, a: ResourceRef, b: ResourceRef) -> Result<()> {
        let a = self.table.get(a)?;
        let b = self.table.get(b)?;
        if a.owning_device() == b.owning_device() {
            Ok(())
        } else {
            Err(WardenError::InvalidArgument(format!(
                "{} and {} belong to different devices",
                a.subject(),
                b.subject()
            )))
        }
    }

    fn device_key(&self, target: ResourceRef) -> Result<ResourceKey> {
        Ok(self.table.get(target)?.owning_device())
    }
}

/// Maps a native failure to [`WardenError::NativeOperationFailed`].
fn native_failure(op: &'static str) -> impl FnOnce(NativeError) -> WardenError {
    move |error| {
        log::error!("Native {op} failed: {error}");
        WardenError::NativeOperationFailed { op, error }
    }
}

// ============================================================================
// Warden
// ============================================================================

/// Lifetime and validation layer over a native graphics driver.
pub struct Warden<D: NativeDriver> {
    driver: D,
    config: WardenConfig,
    validator: UsageValidator,
    registry: Mutex<Registry>,
    sender: flume::Sender<DriverEvent>,
    events: flume::Receiver<DriverEvent>,
}

impl<D: NativeDriver> Warden<D> {
    pub fn new(driver: D, config: WardenConfig) -> Self {
        driver.set_log_level(config.native_log_level);
        let (sender, events) = flume::unbounded();
        log::debug!("Warden created with {config:?}");
        Self {
            driver,
            config,
            validator: UsageValidator::new(config.enforce_alignment),
            registry: Mutex::new(Registry::default()),
            sender,
            events,
        }
    }

    pub fn with_defaults(driver: D) -> Self {
        Self::new(driver, WardenConfig::default())
    }

    #[inline]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[inline]
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Sender for native callbacks that fire outside the facade.
    #[must_use]
    pub fn event_sender(&self) -> EventSender {
        EventSender::new(self.sender.clone())
    }
}

impl<D: NativeDriver> Drop for Warden<D> {
    fn drop(&mut self) {
        if !self.config.warn_on_leaks {
            return;
        }
        let registry = self.registry.get_mut();
        if registry.table.is_empty() {
            return;
        }
        log::warn!(
            "Warden dropped with {} resource(s) still registered",
            registry.table.len()
        );
        for resource in registry.table.iter() {
            log::warn!(
                "  leaked {} (handle {})",
                resource.subject(),
                resource.handle()
            );
        }
    }
}
