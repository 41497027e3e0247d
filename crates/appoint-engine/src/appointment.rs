//! The appointment data model: masters, singles, and change exceptions.
//!
//! A recurring master stores its rule plus two overlay structures: delete
//! exceptions (positions that no longer materialize) and change exceptions
//! (positions promoted to standalone objects). Occurrences themselves are
//! derived, never stored.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::confirmation::ConfirmStatus;
use crate::error::Result;
use crate::recurrence::{expand_series, Occurrence, RecurrenceRule};
use crate::types::{FolderId, ObjectId, ResourceId, ShownAs, Timestamp, UserId};

/// A participant as addressed by the caller: an internal user or a bookable
/// resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Participant {
    User(UserId),
    Resource(ResourceId),
}

/// An internal user resolved onto an appointment, carrying confirmation
/// state. Confirmation is independent per object, so an occurrence promoted
/// to a change exception tracks its own values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserParticipant {
    pub user_id: UserId,
    pub confirmation: ConfirmStatus,
    pub message: Option<String>,
}

impl UserParticipant {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            confirmation: ConfirmStatus::None,
            message: None,
        }
    }
}

/// An appointment object: a single, a recurring master, or a change
/// exception promoted from one occurrence of a master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: ObjectId,
    pub folder_id: FolderId,
    pub title: String,
    pub note: Option<String>,
    pub location: Option<String>,
    /// First-occurrence window for masters, the own window otherwise.
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub full_time: bool,
    /// The creator's zone; governs wall-clock recurrence math.
    pub timezone: Tz,
    /// Recurrence rule. `None` on singles and change exceptions.
    pub recurrence: Option<RecurrenceRule>,
    /// Master reference, set only on change exceptions.
    pub recurrence_id: Option<ObjectId>,
    /// Series position, set only on change exceptions.
    pub recurrence_position: Option<u32>,
    /// Positions suppressed from materializing.
    pub delete_exceptions: BTreeSet<u32>,
    /// Positions promoted to standalone objects.
    pub change_exceptions: BTreeMap<u32, ObjectId>,
    pub participants: Vec<Participant>,
    /// Participants resolved to internal users with confirmation state.
    pub users: Vec<UserParticipant>,
    pub shown_as: ShownAs,
    pub alarm_minutes: Option<i32>,
    pub organizer: UserId,
    pub last_modified: Timestamp,
}

impl Appointment {
    /// Whether this object is a recurring master.
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Whether this object is a change exception of some master.
    #[must_use]
    pub fn is_change_exception(&self) -> bool {
        self.recurrence_id.is_some()
    }

    /// Whether any exception (change or delete) exists on this master.
    #[must_use]
    pub fn has_exceptions(&self) -> bool {
        !self.delete_exceptions.is_empty() || !self.change_exceptions.is_empty()
    }

    #[must_use]
    pub fn is_participant(&self, user: UserId) -> bool {
        self.users.iter().any(|u| u.user_id == user)
    }

    pub fn user_ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.users.iter().map(|u| u.user_id)
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.participants.iter().filter_map(|p| match p {
            Participant::Resource(id) => Some(*id),
            Participant::User(_) => None,
        })
    }

    /// The raw occurrence list: the full expansion for masters, a single
    /// position-1 occurrence otherwise.
    pub fn occurrences(&self) -> Result<Vec<Occurrence>> {
        match &self.recurrence {
            Some(rule) => expand_series(rule, self.start, self.end, self.timezone, self.full_time),
            None => Ok(vec![Occurrence {
                position: 1,
                start: self.start,
                end: self.end,
            }]),
        }
    }

    /// Occurrences that still materialize from the master itself: the raw
    /// expansion minus delete exceptions and minus positions replaced by
    /// change exceptions (those live as their own objects).
    pub fn visible_virtual_occurrences(&self) -> Result<Vec<Occurrence>> {
        Ok(self
            .occurrences()?
            .into_iter()
            .filter(|occ| {
                !self.delete_exceptions.contains(&occ.position)
                    && !self.change_exceptions.contains_key(&occ.position)
            })
            .collect())
    }

    /// The visible series with each position resolved through one lookup
    /// path: virtual where the master still materializes the occurrence,
    /// materialized where a change exception replaced it.
    pub fn resolved_occurrences(&self) -> Result<Vec<ResolvedOccurrence>> {
        Ok(self
            .occurrences()?
            .into_iter()
            .filter(|occ| !self.delete_exceptions.contains(&occ.position))
            .map(|occ| match self.change_exceptions.get(&occ.position) {
                Some(id) => ResolvedOccurrence::Materialized {
                    position: occ.position,
                    id: *id,
                },
                None => ResolvedOccurrence::Virtual(occ),
            })
            .collect())
    }

    /// Number of occurrences still visible: series length minus delete
    /// exceptions. Change exceptions replace rather than remove.
    pub fn visible_occurrence_count(&self) -> Result<usize> {
        let total = self.occurrences()?.len();
        Ok(total.saturating_sub(self.delete_exceptions.len()))
    }
}

/// One visible occurrence, resolved to where its data actually lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedOccurrence {
    /// Derived from the master's rule; not stored anywhere.
    Virtual(Occurrence),
    /// Replaced by a standalone change-exception object.
    Materialized { position: u32, id: ObjectId },
}

/// Payload of an insert: everything the caller controls. Identity, user
/// resolution, and the concurrency token are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentDraft {
    pub folder_id: FolderId,
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub full_time: bool,
    pub timezone: Tz,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub shown_as: ShownAs,
    #[serde(default)]
    pub alarm_minutes: Option<i32>,
}

/// Changed fields of an update. `None` leaves a field untouched; the nested
/// `Option`s distinguish "set to nothing" from "leave alone".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentPatch {
    pub title: Option<String>,
    pub note: Option<Option<String>>,
    pub location: Option<Option<String>>,
    /// New time window (start, end).
    pub time: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub full_time: Option<bool>,
    pub timezone: Option<Tz>,
    /// A differing folder is a move and runs through the move validator.
    pub folder_id: Option<FolderId>,
    /// `Some(None)` dissolves the series into a single appointment.
    pub recurrence: Option<Option<RecurrenceRule>>,
    /// Targets one occurrence of a master; creates or updates its change
    /// exception.
    pub recurrence_position: Option<u32>,
    pub participants: Option<Vec<Participant>>,
    pub shown_as: Option<ShownAs>,
    pub alarm_minutes: Option<Option<i32>>,
}

impl AppointmentPatch {
    /// Whether the patch touches anything the conflict detector cares
    /// about. Metadata-only updates (alarm, title, note) skip the check so
    /// they cannot trip over pre-existing overlaps.
    #[must_use]
    pub fn affects_scheduling(&self) -> bool {
        self.time.is_some()
            || self.full_time.is_some()
            || self.recurrence.is_some()
            || self.participants.is_some()
            || self.shown_as.is_some()
    }
}
