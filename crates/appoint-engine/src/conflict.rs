//! Conflict detection between a candidate time window set and the stored
//! appointments of its participants.
//!
//! Interval intersection is half-open throughout the engine: `[s1, e1)` and
//! `[s2, e2)` conflict iff `s1 < e2 && s2 < e1`. Touching intervals (one
//! ends exactly where the other starts) never conflict.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::appointment::Appointment;
use crate::types::{ObjectId, ResourceId, ShownAs, UserId};

/// An existing appointment found to overlap the candidate.
///
/// `start`/`end` are the interval of the overlapping occurrence, not
/// necessarily the whole series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub id: ObjectId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Half-open interval intersection. Touching boundaries do not overlap.
#[must_use]
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// The candidate side of a conflict check: the windows being written and
/// who is booked into them.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Occurrence windows the write affects. For an exception update this
    /// is the one occurrence; for a series write, every visible occurrence.
    pub windows: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    pub shown_as: ShownAs,
    pub users: HashSet<UserId>,
    pub resources: HashSet<ResourceId>,
    /// The candidate's own object family (itself, its master, its
    /// exceptions); never conflicts with itself.
    pub exclude: HashSet<ObjectId>,
}

impl Candidate {
    fn shares_participant(&self, other: &Appointment) -> bool {
        self.users.iter().any(|u| other.is_participant(*u))
            || other.resource_ids().any(|r| self.resources.contains(&r))
    }
}

/// Scan `existing` for reserved appointments overlapping the candidate.
///
/// Recurring masters are tested occurrence by occurrence with their
/// exception overlay applied: delete-excepted positions are gone, and
/// positions replaced by change exceptions are skipped here because the
/// materialized objects are separate store entries scanned on their own.
/// At most one [`ConflictInfo`] is reported per existing appointment, for
/// the earliest overlapping occurrence.
pub fn detect<'a>(
    candidate: &Candidate,
    existing: impl Iterator<Item = &'a Appointment>,
) -> Vec<ConflictInfo> {
    if !candidate.shown_as.reserves_time() || candidate.windows.is_empty() {
        return Vec::new();
    }

    let mut conflicts = Vec::new();
    for other in existing {
        if candidate.exclude.contains(&other.id) {
            continue;
        }
        if let Some(master) = other.recurrence_id {
            if candidate.exclude.contains(&master) {
                continue;
            }
        }
        if !other.shown_as.reserves_time() {
            continue;
        }
        if !candidate.shares_participant(other) {
            continue;
        }

        let windows = match other.visible_virtual_occurrences() {
            Ok(occurrences) => occurrences,
            Err(err) => {
                // A stored rule that no longer expands is stale data, not a
                // reason to fail the caller's write.
                tracing::warn!(id = %other.id, error = %err, "skipping unexpandable series");
                continue;
            }
        };

        let hit = windows.iter().find(|occ| {
            candidate
                .windows
                .iter()
                .any(|(s, e)| overlaps(*s, *e, occ.start, occ.end))
        });
        if let Some(occ) = hit {
            conflicts.push(ConflictInfo {
                id: other.id,
                title: other.title.clone(),
                start: occ.start,
                end: occ.end,
            });
        }
    }
    conflicts
}
