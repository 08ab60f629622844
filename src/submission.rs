//! Submission Tracker
//!
//! Counts, per resource, how many unretired submissions reference it. A
//! resource may sit in several submissions at once, and the native queue may
//! complete them in any order, so retirement is keyed by [`SubmissionId`]
//! rather than by position.
//!
//! The tracker never polls or blocks; retirement is driven by completion
//! events the facade receives from the driver.

use rustc_hash::FxHashSet;
use slotmap::{new_key_type, SecondaryMap, SlotMap};
use smallvec::SmallVec;

use crate::errors::{Result, WardenError};
use crate::handle::ResourceKey;
use crate::resource::ResourceRef;
use crate::table::HandleTable;

new_key_type! {
    pub struct SubmissionKey;
}

/// Opaque token for one submission.
///
/// The serial is monotonic and only used for ordering in logs; identity is the
/// versioned slot key, so a retired id never matches a later submission.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SubmissionId {
    key: SubmissionKey,
    serial: u64,
}

impl SubmissionId {
    #[inline]
    #[must_use]
    pub fn serial(self) -> u64 {
        self.serial
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "submission #{}", self.serial)
    }
}

#[derive(Debug)]
struct Record {
    serial: u64,
    device: Option<ResourceKey>,
    members: SmallVec<[ResourceKey; 8]>,
}

/// Reference counts of resources held by in-flight submissions.
#[derive(Debug, Default)]
pub struct SubmissionTracker {
    submissions: SlotMap<SubmissionKey, Record>,
    refcounts: SecondaryMap<ResourceKey, u32>,
    next_serial: u64,
}

impl SubmissionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a submission over `resources`.
    ///
    /// Fails with [`WardenError::ResourceDestroyed`] if any member is no longer
    /// alive, in which case no reference count changes. Duplicates in
    /// `resources` are counted once.
    pub fn begin(
        &mut self,
        table: &HandleTable,
        resources: &[ResourceRef],
        device: Option<ResourceKey>,
    ) -> Result<SubmissionId> {
        let mut seen = FxHashSet::default();
        let mut members = SmallVec::new();
        for &resource in resources {
            table.get(resource)?;
            if seen.insert(resource.key()) {
                members.push(resource.key());
            }
        }

        for &key in &members {
            match self.refcounts.get_mut(key) {
                Some(count) => *count += 1,
                None => {
                    self.refcounts.insert(key, 1);
                }
            }
        }

        self.next_serial += 1;
        let serial = self.next_serial;
        let member_count = members.len();
        let key = self.submissions.insert(Record {
            serial,
            device,
            members,
        });
        log::debug!("Began submission #{serial} over {member_count} resource(s)");
        Ok(SubmissionId { key, serial })
    }

    /// Retires a submission and returns the members no longer referenced by
    /// any pending submission.
    pub fn retire(&mut self, id: SubmissionId) -> Result<Vec<ResourceKey>> {
        let record = self.take(id)?;
        log::debug!("Retired submission #{}", record.serial);
        Ok(self.release_members(&record.members))
    }

    /// Retires every pending submission of `device` without completion.
    ///
    /// Returns the abandoned ids and the members no longer referenced.
    pub fn abandon_device(&mut self, device: ResourceKey) -> (Vec<SubmissionId>, Vec<ResourceKey>) {
        let abandoned: Vec<SubmissionId> = self
            .submissions
            .iter()
            .filter(|(_, record)| record.device == Some(device))
            .map(|(key, record)| SubmissionId {
                key,
                serial: record.serial,
            })
            .collect();

        let mut idle = Vec::new();
        for &id in &abandoned {
            if let Some(record) = self.submissions.remove(id.key) {
                log::warn!(
                    "Abandoned submission #{} after device loss",
                    record.serial
                );
                idle.extend(self.release_members(&record.members));
            }
        }
        (abandoned, idle)
    }

    /// Number of pending submissions referencing `key`.
    #[must_use]
    pub fn in_flight(&self, key: ResourceKey) -> u32 {
        self.refcounts.get(key).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_pending(&self, id: SubmissionId) -> bool {
        self.submissions
            .get(id.key)
            .is_some_and(|record| record.serial == id.serial)
    }

    /// Number of unretired submissions.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.submissions.len()
    }

    /// Members of a pending submission.
    #[must_use]
    pub fn members(&self, id: SubmissionId) -> &[ResourceKey] {
        self.submissions
            .get(id.key)
            .filter(|record| record.serial == id.serial)
            .map_or(&[], |record| record.members.as_slice())
    }

    /// Drops the reference count entry of a purged resource.
    pub fn forget(&mut self, key: ResourceKey) {
        self.refcounts.remove(key);
    }

    fn take(&mut self, id: SubmissionId) -> Result<Record> {
        if !self.is_pending(id) {
            return Err(WardenError::UnknownSubmission(id));
        }
        self.submissions
            .remove(id.key)
            .ok_or(WardenError::UnknownSubmission(id))
    }

    fn release_members(&mut self, members: &[ResourceKey]) -> Vec<ResourceKey> {
        let mut idle = Vec::new();
        for &key in members {
            let Some(count) = self.refcounts.get_mut(key) else {
                continue;
            };
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.refcounts.remove(key);
                idle.push(key);
            }
        }
        idle
    }
}
