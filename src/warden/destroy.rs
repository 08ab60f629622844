//! Explicit and cascading destruction.

use super::{native_failure, Warden};
use crate::errors::{Result, WardenError};
use crate::native::NativeDriver;
use crate::resource::ResourceRef;
use crate::table::DestroyCause;
use crate::validate::Operation;

impl<D: NativeDriver> Warden<D> {
    /// Destroys `resource` and everything created from it.
    ///
    /// The whole subtree is checked before anything happens: if any
    /// descendant is still referenced by an in-flight submission the call
    /// fails with [`WardenError::InFlightReference`] and nothing changes.
    /// Descendants are released in post-order, most recently created first.
    ///
    /// A lost device may be destroyed; its descendants are then purged
    /// without native calls. Returns the number of resources destroyed.
    pub fn destroy(&self, resource: impl Into<ResourceRef>) -> Result<usize> {
        let root = resource.into();
        let mut guard = self.registry.lock();
        let registry = &mut *guard;

        registry.check(&self.validator, root, Operation::Destroy)?;

        let order = registry.graph.destruction_order(root.key());
        for &key in &order {
            let in_flight = registry.submissions.in_flight(key);
            if in_flight > 0
                && let Some(descendant) = registry.table.by_key(key)
            {
                return Err(WardenError::InFlightReference {
                    subject: descendant.subject(),
                    op: Operation::Destroy.verb(),
                    submissions: in_flight,
                });
            }
        }

        let entry = registry.table.get(root)?;
        let device_lost = registry.is_device_lost(entry);
        let (kind, handle) = (entry.kind(), entry.handle());

        if device_lost {
            if let Err(error) = self.driver.release(kind, handle) {
                log::warn!("Release of lost {kind} {handle} failed: {error}");
            }
        } else {
            self.driver
                .destroy(kind, handle)
                .map_err(native_failure("destroy"))?;

            for &key in order.iter().filter(|&&key| key != root.key()) {
                let Some(descendant) = registry.table.by_key(key) else {
                    continue;
                };
                if let Err(error) = self.driver.release(descendant.kind(), descendant.handle()) {
                    log::warn!(
                        "Release of {} (handle {}) failed: {error}",
                        descendant.subject(),
                        descendant.handle()
                    );
                }
            }
        }

        let tombstones =
            registry
                .graph
                .cascade_destroy(&mut registry.table, root, DestroyCause::Explicit);
        for key in order {
            registry.submissions.forget(key);
            registry.map_requests.remove(key);
        }

        log::debug!(
            "Destroyed {} {} ({} resource(s))",
            kind,
            root.generation(),
            tombstones.len()
        );
        Ok(tombstones.len())
    }
}
