//! In-memory calendar store: the transactional face of the engine.
//!
//! Every operation is a synchronous transaction. Mutations validate against
//! a clone of the stored object and commit only after every check passed, so
//! a failed write leaves the previously committed state entirely unchanged.
//! The store's logical clock backs the optimistic-concurrency tokens: each
//! committed mutation stamps the affected objects with a fresh
//! [`Timestamp`], and a mutation presenting an older token is rejected.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::appointment::{
    Appointment, AppointmentDraft, AppointmentPatch, Participant, UserParticipant,
};
use crate::confirmation::{
    apply_confirmation, inherit_confirmations, merge_participants, ConfirmStatus,
};
use crate::conflict::{self, Candidate, ConflictInfo};
use crate::error::{EngineError, Result};
use crate::folder::{validate_move, Folder, FolderKind, MoveEffect, Permission};
use crate::freebusy::{self, FreeSlot};
use crate::recurrence::{normalize_full_time, Occurrence};
use crate::types::{FolderId, ObjectId, Timestamp, UserId};

/// Result of an insert or update.
///
/// A conflicting write is not an error: nothing is committed and the
/// overlapping appointments are reported back for the caller to decide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed { id: ObjectId, timestamp: Timestamp },
    Conflicts(Vec<ConflictInfo>),
}

impl WriteOutcome {
    /// The committed id, panicking on a conflict outcome. Test helper.
    #[must_use]
    pub fn committed(&self) -> (ObjectId, Timestamp) {
        match self {
            Self::Committed { id, timestamp } => (*id, *timestamp),
            Self::Conflicts(conflicts) => {
                panic!("expected a committed write, got conflicts: {conflicts:?}")
            }
        }
    }
}

/// One row of an `all` query: an occurrence projected into a time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceView {
    pub id: ObjectId,
    /// Series position; `None` for plain single appointments.
    pub position: Option<u32>,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct CalendarStore {
    folders: HashMap<FolderId, Folder>,
    appointments: HashMap<ObjectId, Appointment>,
    next_object: u32,
    next_folder: u32,
    clock: u64,
}

impl CalendarStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&mut self) -> Timestamp {
        self.clock += 1;
        Timestamp(self.clock)
    }

    fn alloc_object(&mut self) -> ObjectId {
        self.next_object += 1;
        ObjectId(self.next_object)
    }

    // ------------------------------------------------------------------
    // Folders
    // ------------------------------------------------------------------

    /// Create a folder with the owner's implicit full grant.
    pub fn create_folder(&mut self, name: &str, owner: UserId, kind: FolderKind) -> FolderId {
        self.create_folder_with_permissions(name, owner, kind, Vec::new())
    }

    /// Create a folder carrying additional per-user grants.
    pub fn create_folder_with_permissions(
        &mut self,
        name: &str,
        owner: UserId,
        kind: FolderKind,
        mut permissions: Vec<Permission>,
    ) -> FolderId {
        self.next_folder += 1;
        let id = FolderId(self.next_folder);
        if !permissions.iter().any(|p| p.user_id == owner) {
            permissions.push(Permission::full(owner));
        }
        self.folders.insert(
            id,
            Folder {
                id,
                name: name.to_string(),
                owner,
                kind,
                permissions,
            },
        );
        id
    }

    pub fn folder(&self, id: FolderId) -> Result<&Folder> {
        self.folders
            .get(&id)
            .ok_or_else(|| EngineError::NotFound(format!("folder {id} not found")))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert a new appointment (single or recurring master).
    ///
    /// The acting user becomes the organizer, is added to the participant
    /// list if absent, and starts out accepted. With `ignore_conflicts`
    /// unset, overlaps against other reserved appointments of any shared
    /// participant abort the insert and are reported back.
    pub fn insert(
        &mut self,
        acting: UserId,
        draft: AppointmentDraft,
        ignore_conflicts: bool,
    ) -> Result<WriteOutcome> {
        let folder = self.folder(draft.folder_id)?;
        if !folder.may_create(acting) {
            return Err(EngineError::Permission(format!(
                "user {acting} may not create objects in folder {}",
                draft.folder_id
            )));
        }

        let (start, end) = if draft.full_time {
            normalize_full_time(draft.start, draft.end, draft.timezone)
        } else {
            (draft.start, draft.end)
        };
        if end <= start {
            return Err(EngineError::EndBeforeStart { start, end });
        }

        let mut participants = draft.participants.clone();
        if !participants
            .iter()
            .any(|p| matches!(p, Participant::User(u) if *u == acting))
        {
            participants.push(Participant::User(acting));
        }
        let mut users = merge_participants(&[], &participants);
        if let Some(me) = users.iter_mut().find(|u| u.user_id == acting) {
            me.confirmation = ConfirmStatus::Accept;
        }

        let mut appointment = Appointment {
            id: ObjectId(0),
            folder_id: draft.folder_id,
            title: draft.title,
            note: draft.note,
            location: draft.location,
            start,
            end,
            full_time: draft.full_time,
            timezone: draft.timezone,
            recurrence: draft.recurrence,
            recurrence_id: None,
            recurrence_position: None,
            delete_exceptions: Default::default(),
            change_exceptions: Default::default(),
            participants,
            users,
            shown_as: draft.shown_as,
            alarm_minutes: draft.alarm_minutes,
            organizer: acting,
            last_modified: Timestamp(0),
        };

        // Validates the rule as a side effect.
        let windows = occurrence_windows(&appointment)?;

        if !ignore_conflicts {
            let conflicts = conflict::detect(
                &self.candidate(&appointment, windows),
                self.appointments.values(),
            );
            if !conflicts.is_empty() {
                return Ok(WriteOutcome::Conflicts(conflicts));
            }
        }

        let id = self.alloc_object();
        let timestamp = self.tick();
        appointment.id = id;
        appointment.last_modified = timestamp;
        tracing::debug!(%id, %timestamp, "insert committed");
        self.appointments.insert(id, appointment);
        Ok(WriteOutcome::Committed { id, timestamp })
    }

    /// Update an appointment, addressed by id, folder, and concurrency
    /// token. A `recurrence_position` in the patch targets one occurrence
    /// of a master and creates or refreshes its change exception; the
    /// committed id is then the exception's. A differing `folder_id` is a
    /// move and runs through the move validator.
    pub fn update(
        &mut self,
        acting: UserId,
        id: ObjectId,
        folder_id: FolderId,
        token: Timestamp,
        patch: AppointmentPatch,
        ignore_conflicts: bool,
    ) -> Result<WriteOutcome> {
        let current = self.addressed(id, folder_id)?.clone();
        check_token(&current, token)?;
        self.check_write_permission(acting, &current)?;

        if let Some(position) = patch.recurrence_position {
            return self.update_occurrence(acting, current, position, patch, ignore_conflicts);
        }

        if let Some(dest_id) = patch.folder_id {
            if dest_id != current.folder_id {
                return self.move_appointment(acting, current, dest_id, patch, ignore_conflicts);
            }
        }

        // Plain in-place update.
        let dissolved: Vec<ObjectId> = if matches!(patch.recurrence, Some(None)) {
            current.change_exceptions.values().copied().collect()
        } else {
            Vec::new()
        };

        let mut candidate = apply_patch(&current, &patch)?;
        if matches!(patch.recurrence, Some(None)) {
            candidate.delete_exceptions.clear();
            candidate.change_exceptions.clear();
        }
        reset_on_reschedule(&current, &mut candidate, acting);

        if patch.affects_scheduling() && !ignore_conflicts {
            let windows = occurrence_windows(&candidate)?;
            let conflicts = conflict::detect(
                &self.candidate(&candidate, windows),
                self.appointments.values(),
            );
            if !conflicts.is_empty() {
                return Ok(WriteOutcome::Conflicts(conflicts));
            }
        }

        let timestamp = self.tick();
        for orphan in dissolved {
            self.appointments.remove(&orphan);
        }
        let mut committed = candidate;
        committed.last_modified = timestamp;
        tracing::debug!(%id, %timestamp, "update committed");
        self.appointments.insert(id, committed);
        Ok(WriteOutcome::Committed { id, timestamp })
    }

    /// Update one occurrence of a recurring master: creates its change
    /// exception, or refreshes the existing one in place.
    fn update_occurrence(
        &mut self,
        acting: UserId,
        master: Appointment,
        position: u32,
        patch: AppointmentPatch,
        ignore_conflicts: bool,
    ) -> Result<WriteOutcome> {
        if master.is_change_exception() {
            // Guards double-exception creation: a materialized occurrence
            // has no further positions of its own.
            return Err(EngineError::InvalidRecurrence(
                "object is already a series exception and has no positions".to_string(),
            ));
        }
        if master.recurrence.is_none() {
            return Err(EngineError::InvalidRecurrence(
                "appointment has no recurrence".to_string(),
            ));
        }
        if patch.recurrence.is_some() {
            return Err(EngineError::InvalidRecurrence(
                "a single occurrence cannot carry its own recurrence".to_string(),
            ));
        }
        if patch.folder_id.is_some_and(|f| f != master.folder_id) {
            return Err(EngineError::RecurringFolderMove);
        }
        if master.delete_exceptions.contains(&position) {
            return Err(EngineError::NotFound(format!(
                "occurrence at position {position} is deleted"
            )));
        }

        let occurrences = master.occurrences()?;
        let occurrence = occurrences
            .iter()
            .find(|o| o.position == position)
            .copied()
            .ok_or_else(|| {
                EngineError::NotFound(format!("series has no occurrence at position {position}"))
            })?;

        let (ex_id, base) = match master.change_exceptions.get(&position) {
            Some(existing_id) => {
                let existing = self
                    .appointments
                    .get(existing_id)
                    .ok_or_else(|| {
                        EngineError::NotFound(format!("exception object {existing_id} is gone"))
                    })?
                    .clone();
                (Some(*existing_id), existing)
            }
            None => (
                None,
                exception_template(&master, &occurrence, acting, patch.time),
            ),
        };

        let mut candidate = apply_patch(&base, &patch)?;
        if ex_id.is_some() {
            reset_on_reschedule(&base, &mut candidate, acting);
        }

        if patch.affects_scheduling() && !ignore_conflicts {
            let windows = vec![(candidate.start, candidate.end)];
            let conflicts = conflict::detect(
                &self.candidate_with_family(&candidate, &master, windows),
                self.appointments.values(),
            );
            if !conflicts.is_empty() {
                return Ok(WriteOutcome::Conflicts(conflicts));
            }
        }

        let id = match ex_id {
            Some(id) => id,
            None => self.alloc_object(),
        };
        let timestamp = self.tick();
        candidate.id = id;
        candidate.last_modified = timestamp;
        self.appointments.insert(id, candidate);

        let master_id = master.id;
        if let Some(stored_master) = self.appointments.get_mut(&master_id) {
            stored_master.change_exceptions.insert(position, id);
            stored_master.last_modified = timestamp;
        }
        tracing::debug!(%master_id, exception = %id, position, %timestamp, "occurrence update committed");
        Ok(WriteOutcome::Committed { id, timestamp })
    }

    /// Relocate an appointment into another folder.
    fn move_appointment(
        &mut self,
        acting: UserId,
        current: Appointment,
        dest_id: FolderId,
        patch: AppointmentPatch,
        ignore_conflicts: bool,
    ) -> Result<WriteOutcome> {
        let source = self.folder(current.folder_id)?;
        let dest = self.folder(dest_id)?;
        let effect = validate_move(&current, acting, source, dest)?;

        let mut candidate = apply_patch(&current, &patch)?;
        candidate.folder_id = dest_id;
        if effect == MoveEffect::AddOwnerAsParticipant
            && !candidate.is_participant(candidate.organizer)
        {
            candidate
                .participants
                .push(Participant::User(candidate.organizer));
            candidate.users.push(UserParticipant {
                user_id: candidate.organizer,
                confirmation: ConfirmStatus::Accept,
                message: None,
            });
        }
        reset_on_reschedule(&current, &mut candidate, acting);

        if patch.affects_scheduling() && !ignore_conflicts {
            let windows = occurrence_windows(&candidate)?;
            let conflicts = conflict::detect(
                &self.candidate(&candidate, windows),
                self.appointments.values(),
            );
            if !conflicts.is_empty() {
                return Ok(WriteOutcome::Conflicts(conflicts));
            }
        }

        let id = candidate.id;
        let timestamp = self.tick();
        candidate.last_modified = timestamp;
        tracing::debug!(%id, from = %current.folder_id, to = %dest_id, %timestamp, "move committed");
        self.appointments.insert(id, candidate);
        Ok(WriteOutcome::Committed { id, timestamp })
    }

    /// Delete an appointment, or one occurrence of a recurring master.
    ///
    /// Deleting a change exception by its own id converges to the same
    /// state as deleting the master's occurrence: the position becomes a
    /// delete exception. Deleting the last visible occurrence removes the
    /// master entirely. A mismatched folder on an otherwise valid target is
    /// tolerated: stale folder references must not wedge a delete.
    pub fn delete(
        &mut self,
        acting: UserId,
        id: ObjectId,
        folder_id: FolderId,
        token: Timestamp,
        position: Option<u32>,
    ) -> Result<Timestamp> {
        let current = self
            .appointments
            .get(&id)
            .ok_or_else(|| EngineError::NotFound(format!("object {id} not found")))?
            .clone();
        if current.folder_id != folder_id {
            tracing::debug!(%id, given = %folder_id, actual = %current.folder_id,
                "delete addressed through a stale folder; proceeding");
        }
        check_token(&current, token)?;
        let folder = self.folder(current.folder_id)?;
        if !(folder.may_delete(acting) || current.organizer == acting) {
            return Err(EngineError::Permission(format!(
                "user {acting} may not delete object {id}"
            )));
        }

        match position {
            Some(position) => self.delete_occurrence(current, position),
            None => {
                let timestamp = self.tick();
                if current.is_change_exception() {
                    self.appointments.remove(&id);
                    self.register_delete_exception(&current, timestamp);
                } else {
                    // Masters take their exception objects with them.
                    for ex_id in current.change_exceptions.values() {
                        self.appointments.remove(ex_id);
                    }
                    self.appointments.remove(&id);
                }
                tracing::debug!(%id, %timestamp, "delete committed");
                Ok(timestamp)
            }
        }
    }

    fn delete_occurrence(&mut self, master: Appointment, position: u32) -> Result<Timestamp> {
        if master.recurrence.is_none() {
            return Err(EngineError::InvalidRecurrence(
                "appointment has no recurrence".to_string(),
            ));
        }
        let series_len = master.occurrences()?.len() as u32;
        if position == 0 || position > series_len {
            return Err(EngineError::NotFound(format!(
                "series has no occurrence at position {position}"
            )));
        }
        if master.delete_exceptions.contains(&position) {
            // A second delete of the same position is an error, never a
            // second exception.
            return Err(EngineError::NotFound(format!(
                "occurrence at position {position} is already deleted"
            )));
        }

        let timestamp = self.tick();
        if let Some(ex_id) = master.change_exceptions.get(&position) {
            self.appointments.remove(ex_id);
        }
        let master_id = master.id;
        let mut remove_master = false;
        if let Some(stored) = self.appointments.get_mut(&master_id) {
            stored.change_exceptions.remove(&position);
            stored.delete_exceptions.insert(position);
            stored.last_modified = timestamp;
            remove_master = stored.delete_exceptions.len() as u32 >= series_len;
        }
        if remove_master {
            self.appointments.remove(&master_id);
        }
        tracing::debug!(%master_id, position, %timestamp, removed_master = remove_master,
            "occurrence delete committed");
        Ok(timestamp)
    }

    /// Record `current`'s position as a delete exception on its master, and
    /// drop the master when nothing visible remains.
    fn register_delete_exception(&mut self, exception: &Appointment, timestamp: Timestamp) {
        let (Some(master_id), Some(position)) =
            (exception.recurrence_id, exception.recurrence_position)
        else {
            return;
        };
        let mut remove_master = false;
        if let Some(master) = self.appointments.get_mut(&master_id) {
            master.change_exceptions.remove(&position);
            master.delete_exceptions.insert(position);
            master.last_modified = timestamp;
            if let Ok(occurrences) = master.occurrences() {
                remove_master = master.delete_exceptions.len() >= occurrences.len();
            }
        }
        if remove_master {
            self.appointments.remove(&master_id);
        }
    }

    /// Record one user's confirmation. With a `position`, the statement
    /// applies to that occurrence only: its change exception is confirmed,
    /// being materialized first if needed (inheriting the master's state,
    /// time unchanged).
    pub fn confirm(
        &mut self,
        acting: UserId,
        id: ObjectId,
        folder_id: FolderId,
        token: Timestamp,
        status: ConfirmStatus,
        message: Option<String>,
        position: Option<u32>,
    ) -> Result<Timestamp> {
        let current = self.addressed(id, folder_id)?.clone();
        check_token(&current, token)?;

        let Some(position) = position else {
            let mut updated = current;
            apply_confirmation(&mut updated.users, acting, status, message)?;
            let timestamp = self.tick();
            updated.last_modified = timestamp;
            self.appointments.insert(id, updated);
            tracing::debug!(%id, user = %acting, %timestamp, "confirmation committed");
            return Ok(timestamp);
        };

        if current.recurrence.is_none() {
            return Err(EngineError::InvalidRecurrence(
                "appointment has no recurrence".to_string(),
            ));
        }
        if current.delete_exceptions.contains(&position) {
            return Err(EngineError::NotFound(format!(
                "occurrence at position {position} is deleted"
            )));
        }

        if let Some(&ex_id) = current.change_exceptions.get(&position) {
            let mut exception = self
                .appointments
                .get(&ex_id)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(format!("exception object {ex_id} is gone")))?;
            apply_confirmation(&mut exception.users, acting, status, message)?;
            let timestamp = self.tick();
            exception.last_modified = timestamp;
            self.appointments.insert(ex_id, exception);
            return Ok(timestamp);
        }

        let occurrences = current.occurrences()?;
        let occurrence = occurrences
            .iter()
            .find(|o| o.position == position)
            .copied()
            .ok_or_else(|| {
                EngineError::NotFound(format!("series has no occurrence at position {position}"))
            })?;

        let mut exception = exception_template(&current, &occurrence, acting, None);
        apply_confirmation(&mut exception.users, acting, status, message)?;

        let ex_id = self.alloc_object();
        let timestamp = self.tick();
        exception.id = ex_id;
        exception.last_modified = timestamp;
        self.appointments.insert(ex_id, exception);
        if let Some(master) = self.appointments.get_mut(&id) {
            master.change_exceptions.insert(position, ex_id);
            master.last_modified = timestamp;
        }
        tracing::debug!(%id, exception = %ex_id, position, user = %acting, %timestamp,
            "occurrence confirmation committed");
        Ok(timestamp)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Full projection of one appointment.
    pub fn get(&self, acting: UserId, id: ObjectId, folder_id: FolderId) -> Result<&Appointment> {
        let appointment = self.addressed(id, folder_id)?;
        let folder = self.folder(appointment.folder_id)?;
        if folder.may_read(acting)
            || appointment.is_participant(acting)
            || appointment.organizer == acting
        {
            Ok(appointment)
        } else {
            Err(EngineError::Permission(format!(
                "user {acting} may not read object {id}"
            )))
        }
    }

    /// Batch lookup. Unknown or inaccessible references are skipped rather
    /// than failing the whole request.
    #[must_use]
    pub fn list(&self, acting: UserId, refs: &[(ObjectId, FolderId)]) -> Vec<&Appointment> {
        refs.iter()
            .filter_map(|(id, folder)| self.get(acting, *id, *folder).ok())
            .collect()
    }

    /// Every occurrence in the folder intersecting the half-open window
    /// `[from, to)`, ordered by start time. Masters contribute their
    /// visible virtual occurrences; change exceptions and singles
    /// contribute their own window.
    pub fn all(
        &self,
        acting: UserId,
        folder_id: FolderId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OccurrenceView>> {
        let folder = self.folder(folder_id)?;
        if !folder.may_read(acting) {
            return Err(EngineError::Permission(format!(
                "user {acting} may not read folder {folder_id}"
            )));
        }

        let mut views = Vec::new();
        for appointment in self
            .appointments
            .values()
            .filter(|a| a.folder_id == folder_id)
        {
            if appointment.is_master() {
                let occurrences = match appointment.visible_virtual_occurrences() {
                    Ok(occurrences) => occurrences,
                    Err(err) => {
                        tracing::warn!(id = %appointment.id, error = %err,
                            "skipping unexpandable series");
                        continue;
                    }
                };
                for occ in occurrences {
                    if conflict::overlaps(occ.start, occ.end, from, to) {
                        views.push(OccurrenceView {
                            id: appointment.id,
                            position: Some(occ.position),
                            title: appointment.title.clone(),
                            start: occ.start,
                            end: occ.end,
                        });
                    }
                }
            } else if conflict::overlaps(appointment.start, appointment.end, from, to) {
                views.push(OccurrenceView {
                    id: appointment.id,
                    position: appointment.recurrence_position,
                    title: appointment.title.clone(),
                    start: appointment.start,
                    end: appointment.end,
                });
            }
        }
        views.sort_by_key(|v| (v.start, v.id));
        Ok(views)
    }

    /// Case-insensitive substring search over title, note, and location.
    #[must_use]
    pub fn search(
        &self,
        acting: UserId,
        pattern: &str,
        folder_id: Option<FolderId>,
    ) -> Vec<&Appointment> {
        let needle = pattern.to_lowercase();
        let mut hits: Vec<&Appointment> = self
            .appointments
            .values()
            .filter(|a| folder_id.is_none_or(|f| a.folder_id == f))
            .filter(|a| {
                self.folders
                    .get(&a.folder_id)
                    .is_some_and(|f| f.may_read(acting))
            })
            .filter(|a| {
                a.title.to_lowercase().contains(&needle)
                    || a.note
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&needle))
                    || a.location
                        .as_deref()
                        .is_some_and(|l| l.to_lowercase().contains(&needle))
            })
            .collect();
        hits.sort_by_key(|a| a.id);
        hits
    }

    /// Objects in the folder modified after `since`, oldest first.
    pub fn updates(
        &self,
        acting: UserId,
        folder_id: FolderId,
        since: Timestamp,
    ) -> Result<Vec<&Appointment>> {
        let folder = self.folder(folder_id)?;
        if !folder.may_read(acting) {
            return Err(EngineError::Permission(format!(
                "user {acting} may not read folder {folder_id}"
            )));
        }
        let mut changed: Vec<&Appointment> = self
            .appointments
            .values()
            .filter(|a| a.folder_id == folder_id && a.last_modified > since)
            .collect();
        changed.sort_by_key(|a| (a.last_modified, a.id));
        Ok(changed)
    }

    /// Reserved intervals of one user intersecting `[from, to)`, across all
    /// folders. Free-marked appointments are excluded.
    #[must_use]
    pub fn busy_intervals(
        &self,
        user: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        let mut intervals = Vec::new();
        for appointment in self.appointments.values() {
            if !appointment.shown_as.reserves_time() || !appointment.is_participant(user) {
                continue;
            }
            let occurrences = match appointment.visible_virtual_occurrences() {
                Ok(occurrences) => occurrences,
                Err(_) => continue,
            };
            intervals.extend(
                occurrences
                    .iter()
                    .filter(|o| conflict::overlaps(o.start, o.end, from, to))
                    .map(|o| (o.start, o.end)),
            );
        }
        intervals
    }

    /// Free gaps of one user within `[from, to)`.
    #[must_use]
    pub fn free_slots(&self, user: UserId, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<FreeSlot> {
        freebusy::free_slots(&self.busy_intervals(user, from, to), from, to)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn addressed(&self, id: ObjectId, folder_id: FolderId) -> Result<&Appointment> {
        let appointment = self
            .appointments
            .get(&id)
            .ok_or_else(|| EngineError::NotFound(format!("object {id} not found")))?;
        if appointment.folder_id != folder_id {
            return Err(EngineError::NotFound(format!(
                "object {id} not found in folder {folder_id}"
            )));
        }
        Ok(appointment)
    }

    fn check_write_permission(&self, acting: UserId, appointment: &Appointment) -> Result<()> {
        let folder = self.folder(appointment.folder_id)?;
        if folder.may_write(acting)
            || appointment.organizer == acting
            || appointment.is_participant(acting)
        {
            Ok(())
        } else {
            Err(EngineError::Permission(format!(
                "user {acting} may not modify object {}",
                appointment.id
            )))
        }
    }

    fn candidate(
        &self,
        appointment: &Appointment,
        windows: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Candidate {
        let mut exclude: HashSet<ObjectId> = HashSet::from([appointment.id]);
        exclude.extend(appointment.change_exceptions.values().copied());
        if let Some(master_id) = appointment.recurrence_id {
            exclude.insert(master_id);
            if let Some(master) = self.appointments.get(&master_id) {
                exclude.extend(master.change_exceptions.values().copied());
            }
        }
        Candidate {
            windows,
            shown_as: appointment.shown_as,
            users: appointment.user_ids().collect(),
            resources: appointment.resource_ids().collect(),
            exclude,
        }
    }

    fn candidate_with_family(
        &self,
        appointment: &Appointment,
        master: &Appointment,
        windows: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Candidate {
        let mut candidate = self.candidate(appointment, windows);
        candidate.exclude.insert(master.id);
        candidate
            .exclude
            .extend(master.change_exceptions.values().copied());
        candidate
    }
}

fn check_token(appointment: &Appointment, token: Timestamp) -> Result<()> {
    if appointment.last_modified == token {
        Ok(())
    } else {
        Err(EngineError::ConcurrentModification {
            stored: appointment.last_modified,
            supplied: token,
        })
    }
}

/// The candidate windows a write is judged against: every visible
/// occurrence for a master, the own window otherwise. Validates the rule as
/// a side effect.
fn occurrence_windows(appointment: &Appointment) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
    Ok(appointment
        .visible_virtual_occurrences()?
        .iter()
        .map(|o| (o.start, o.end))
        .collect())
}

/// Apply changed fields onto a clone of `base` and re-validate the result.
fn apply_patch(base: &Appointment, patch: &AppointmentPatch) -> Result<Appointment> {
    if base.is_change_exception() && matches!(patch.recurrence, Some(Some(_))) {
        return Err(EngineError::InvalidRecurrence(
            "a series exception cannot itself recur".to_string(),
        ));
    }

    let mut appointment = base.clone();
    if let Some(title) = &patch.title {
        appointment.title = title.clone();
    }
    if let Some(note) = &patch.note {
        appointment.note = note.clone();
    }
    if let Some(location) = &patch.location {
        appointment.location = location.clone();
    }
    if let Some(full_time) = patch.full_time {
        appointment.full_time = full_time;
    }
    if let Some(timezone) = patch.timezone {
        appointment.timezone = timezone;
    }
    if let Some((start, end)) = patch.time {
        appointment.start = start;
        appointment.end = end;
    }
    if let Some(recurrence) = patch.recurrence {
        appointment.recurrence = recurrence;
    }
    if let Some(participants) = &patch.participants {
        appointment.users = merge_participants(&appointment.users, participants);
        appointment.participants = participants.clone();
        if !appointment.is_participant(appointment.organizer) {
            appointment
                .participants
                .push(Participant::User(appointment.organizer));
            appointment.users.push(UserParticipant {
                user_id: appointment.organizer,
                confirmation: ConfirmStatus::Accept,
                message: None,
            });
        }
    }
    if let Some(shown_as) = patch.shown_as {
        appointment.shown_as = shown_as;
    }
    if let Some(alarm) = patch.alarm_minutes {
        appointment.alarm_minutes = alarm;
    }

    if appointment.full_time {
        let (start, end) =
            normalize_full_time(appointment.start, appointment.end, appointment.timezone);
        appointment.start = start;
        appointment.end = end;
    }
    if appointment.end <= appointment.start {
        return Err(EngineError::EndBeforeStart {
            start: appointment.start,
            end: appointment.end,
        });
    }
    // Re-validates rule and until-vs-start consistency on the new window.
    appointment.occurrences()?;
    Ok(appointment)
}

/// A reschedule invalidates everyone else's statement: when the committed
/// time window actually changed, every participant except the acting one
/// falls back to no confirmation.
fn reset_on_reschedule(base: &Appointment, candidate: &mut Appointment, acting: UserId) {
    if candidate.start != base.start || candidate.end != base.end {
        candidate.users = inherit_confirmations(&candidate.users, acting, true);
    }
}

/// A change exception carved out of `master` at `occurrence`, not yet
/// committed: the id and token are assigned at commit time.
fn exception_template(
    master: &Appointment,
    occurrence: &Occurrence,
    acting: UserId,
    new_time: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Appointment {
    let time_changed =
        new_time.is_some_and(|(start, end)| start != occurrence.start || end != occurrence.end);
    Appointment {
        id: ObjectId(0),
        folder_id: master.folder_id,
        title: master.title.clone(),
        note: master.note.clone(),
        location: master.location.clone(),
        start: occurrence.start,
        end: occurrence.end,
        full_time: master.full_time,
        timezone: master.timezone,
        recurrence: None,
        recurrence_id: Some(master.id),
        recurrence_position: Some(occurrence.position),
        delete_exceptions: Default::default(),
        change_exceptions: Default::default(),
        participants: master.participants.clone(),
        users: inherit_confirmations(&master.users, acting, time_changed),
        shown_as: master.shown_as,
        alarm_minutes: master.alarm_minutes,
        organizer: master.organizer,
        last_modified: Timestamp(0),
    }
}
