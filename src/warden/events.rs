//! Completion processing and device loss.
//!
//! Events may race with destruction: a map callback can fire for a buffer the
//! application already destroyed, or a work-done signal can name a submission
//! that was abandoned after device loss. Such events are logged and counted
//! as ignored, never reported as errors.

use super::{Registry, Warden};
use crate::errors::{Result, WardenError};
use crate::handle::{Handle, ResourceKey};
use crate::native::{DriverEvent, MapAsyncStatus, MapToken, NativeDriver};
use crate::resource::{BufferState, DeviceId, DeviceState, EncoderState, ResourceState};
use crate::submission::SubmissionId;
use crate::table::DestroyCause;
use crate::validate::Operation;

/// What one round of completion processing did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub submissions_retired: usize,
    pub maps_completed: usize,
    pub maps_failed: usize,
    pub devices_lost: usize,
    pub encoders_released: usize,
    pub events_ignored: usize,
}

impl PollSummary {
    /// Whether no event was processed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl<D: NativeDriver> Warden<D> {
    /// Polls every active device once, then applies all queued events.
    ///
    /// Never blocks waiting for the GPU.
    pub fn poll_completions(&self) -> PollSummary {
        let mut registry = self.registry.lock();
        let mut summary = PollSummary::default();

        let devices: Vec<Handle> = registry
            .table
            .iter()
            .filter(|resource| resource.state() == ResourceState::Device(DeviceState::Active))
            .map(|resource| resource.handle())
            .collect();

        let mut events = Vec::new();
        for device in devices {
            events.extend(self.driver.poll(device));
        }
        events.extend(self.events.try_iter());

        for event in events {
            self.apply_event(&mut registry, event, &mut summary);
        }
        if !summary.is_empty() {
            log::debug!("Processed completions: {summary:?}");
        }
        summary
    }

    /// Applies one event immediately.
    pub fn signal(&self, event: DriverEvent) -> PollSummary {
        let mut registry = self.registry.lock();
        let mut summary = PollSummary::default();
        self.apply_event(&mut registry, event, &mut summary);
        summary
    }

    /// Marks a device lost. Every later operation on the device or anything
    /// created from it fails with [`WardenError::DeviceLost`] without reaching
    /// the driver, and its unretired submissions are abandoned.
    ///
    /// Marking an already lost device again does nothing.
    pub fn mark_device_lost(&self, device: DeviceId, reason: &str) -> Result<()> {
        let mut registry = self.registry.lock();
        registry.table.get(device.raw())?;
        self.lose_device(&mut registry, device.raw().key(), reason)
            .map(|_| ())
    }

    fn apply_event(&self, registry: &mut Registry, event: DriverEvent, summary: &mut PollSummary) {
        match event {
            DriverEvent::WorkDone(id) => self.retire(registry, id, summary),
            DriverEvent::MapCompleted { request, status } => {
                self.complete_map(registry, request, status, summary);
            }
            DriverEvent::DeviceLost { device, reason } => {
                if let Err(err) = registry.table.get(device.raw()) {
                    log::warn!("Ignoring device loss ({reason}): {err}");
                    summary.events_ignored += 1;
                    return;
                }
                match self.lose_device(registry, device.raw().key(), &reason) {
                    Ok(Some(released)) => {
                        summary.devices_lost += 1;
                        summary.encoders_released += released;
                    }
                    _ => summary.events_ignored += 1,
                }
            }
        }
    }

    fn retire(&self, registry: &mut Registry, id: SubmissionId, summary: &mut PollSummary) {
        let idle = match registry.submissions.retire(id) {
            Ok(idle) => idle,
            Err(err) => {
                log::warn!("Ignoring completion: {err}");
                summary.events_ignored += 1;
                return;
            }
        };
        summary.submissions_retired += 1;
        summary.encoders_released += self.release_idle_encoders(registry, idle);
    }

    /// Releases submitted encoders no pending submission references any more.
    /// Encoders of a lost device are purged without native calls.
    fn release_idle_encoders(&self, registry: &mut Registry, idle: Vec<ResourceKey>) -> usize {
        if !self.config.release_retired_encoders {
            return 0;
        }
        let mut released = 0;
        for key in idle {
            let Some(resource) = registry.table.by_key(key) else {
                continue;
            };
            if resource.state() != ResourceState::CommandEncoder(EncoderState::Submitted) {
                continue;
            }
            let encoder = resource.to_ref();
            if !registry.is_device_lost(resource)
                && let Err(error) = self.driver.release(resource.kind(), resource.handle())
            {
                log::warn!("Release of {} failed: {error}", resource.subject());
            }
            registry
                .graph
                .cascade_destroy(&mut registry.table, encoder, DestroyCause::Released);
            registry.submissions.forget(key);
            released += 1;
        }
        released
    }

    fn complete_map(
        &self,
        registry: &mut Registry,
        request: MapToken,
        status: MapAsyncStatus,
        summary: &mut PollSummary,
    ) {
        let target = request.buffer().raw();
        let outstanding = match registry.table.get(target) {
            Ok(entry) => {
                matches!(
                    entry.state(),
                    ResourceState::Buffer(BufferState::MapPending { .. })
                ) && registry.map_requests.get(target.key()) == Some(&request.request())
            }
            Err(err) => {
                log::debug!("Map completion ({status:?}) after destruction: {err}");
                summary.events_ignored += 1;
                return;
            }
        };
        if !outstanding {
            // Aborted by unmap, or superseded by a later request.
            log::debug!(
                "Stale map completion for buffer {} ({status:?})",
                target.generation()
            );
            summary.events_ignored += 1;
            return;
        }

        let op = Operation::CompleteMap {
            success: status.is_success(),
        };
        let applied = registry
            .check(&self.validator, target, op)
            .and_then(|transition| registry.apply(target, transition));
        match applied {
            Ok(()) => {
                registry.map_requests.remove(target.key());
                if status.is_success() {
                    summary.maps_completed += 1;
                } else {
                    log::warn!("Map of buffer {} failed: {status:?}", target.generation());
                    summary.maps_failed += 1;
                }
            }
            Err(err) => {
                log::warn!("Ignoring map completion: {err}");
                summary.events_ignored += 1;
            }
        }
    }

    /// Returns the number of encoders purged, or `None` if the device was
    /// already lost.
    fn lose_device(
        &self,
        registry: &mut Registry,
        device: ResourceKey,
        reason: &str,
    ) -> Result<Option<usize>> {
        let Some(entry) = registry.table.by_key(device) else {
            return Err(WardenError::InvalidArgument(
                "device is not registered".to_owned(),
            ));
        };
        let target = entry.to_ref();
        let was_lost = entry.state() == ResourceState::Device(DeviceState::Lost);

        let transition = registry.check(&self.validator, target, Operation::MarkLost)?;
        if was_lost {
            return Ok(None);
        }
        registry.apply(target, transition)?;

        let (abandoned, idle) = registry.submissions.abandon_device(device);
        let released = self.release_idle_encoders(registry, idle);
        log::warn!(
            "{} lost: {reason} ({} submission(s) abandoned)",
            registry.table.by_key(device).map_or_else(
                || target.kind().to_string(),
                |entry| entry.subject().to_string()
            ),
            abandoned.len()
        );
        Ok(Some(released))
    }
}
