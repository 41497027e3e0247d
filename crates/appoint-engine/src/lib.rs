//! # appoint-engine
//!
//! Recurring-appointment engine for a groupware calendar: deterministic
//! series expansion with DST handling, exception overlays, conflict
//! detection, per-participant confirmation tracking, and folder-move
//! validation, behind an in-memory transactional store.
//!
//! Recurrence math is pure: every expansion is a function of the rule, the
//! first occurrence's window, and an explicit timezone. Nothing depends on
//! the process timezone or the wall clock, so the same inputs always expand
//! to the same occurrence list.
//!
//! ## Modules
//!
//! - [`recurrence`] — rule model and series expansion (wraps the `rrule`
//!   crate, wall-clock preserving across DST)
//! - [`appointment`] — masters, singles, change exceptions, and the
//!   occurrence overlay
//! - [`conflict`] — half-open interval conflict detection
//! - [`confirmation`] — per-participant confirmation state and inheritance
//! - [`folder`] — folders, grants, and the folder-move validator
//! - [`freebusy`] — busy-block merging and free-slot computation
//! - [`store`] — the transactional in-memory store tying it all together
//! - [`error`] — error types and stable error codes
//! - [`types`] — identifier newtypes and shared value types

pub mod appointment;
pub mod confirmation;
pub mod conflict;
pub mod error;
pub mod folder;
pub mod freebusy;
pub mod recurrence;
pub mod store;
pub mod types;

pub use appointment::{
    Appointment, AppointmentDraft, AppointmentPatch, Participant, ResolvedOccurrence,
    UserParticipant,
};
pub use confirmation::ConfirmStatus;
pub use conflict::{overlaps, ConflictInfo};
pub use error::{EngineError, Result};
pub use folder::{Folder, FolderKind, MoveEffect, Permission};
pub use freebusy::{BusyBlock, FreeSlot};
pub use recurrence::{
    expand_series, normalize_full_time, occurrences_in_window, parse_timezone, Occurrence,
    RecurrencePattern, RecurrenceRule, SeriesEnd, Weekday, WeekdaySet, MAX_OCCURRENCES,
};
pub use store::{CalendarStore, OccurrenceView, WriteOutcome};
pub use types::{FolderId, ObjectId, ResourceId, ShownAs, Timestamp, UserId};
