//! Error types for engine operations.
//!
//! Scheduling conflicts are deliberately NOT an error variant: a conflicting
//! write returns a conflict list as a non-fatal outcome (see
//! [`crate::store::WriteOutcome`]) and commits nothing.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::Timestamp;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The appointment's end does not lie after its start.
    #[error("end date {end} is not after start date {start}")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// The series' until boundary lies before the first occurrence.
    #[error("series end {until} lies before start date {start}")]
    UntilBeforeStart {
        start: DateTime<Utc>,
        until: DateTime<Utc>,
    },

    /// Structurally invalid recurrence rule (empty day mask, day 0, ...).
    #[error("invalid recurrence rule: {0}")]
    InvalidRecurrence(String),

    /// The rule was structurally valid but could not be expanded.
    #[error("recurrence expansion failed: {0}")]
    Expansion(String),

    /// Not a valid IANA timezone identifier.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Object deleted, never existed, or not visible under the given folder.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The supplied concurrency token is older than the stored one.
    #[error("object was modified concurrently (stored token {stored}, supplied {supplied})")]
    ConcurrentModification {
        stored: Timestamp,
        supplied: Timestamp,
    },

    /// A recurring series with existing exceptions cannot change folders.
    #[error("a recurring series with exceptions cannot be moved to another folder")]
    RecurringFolderMove,

    /// Folder/object ACL denial.
    #[error("permission denied: {0}")]
    Permission(String),
}

impl EngineError {
    /// Stable machine-readable code, for callers that match on codes rather
    /// than message text.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EndBeforeStart { .. } => "APP-0010",
            Self::UntilBeforeStart { .. } => "APP-0011",
            Self::InvalidRecurrence(_) => "APP-0012",
            Self::Expansion(_) => "APP-0013",
            Self::InvalidTimezone(_) => "APP-0014",
            Self::NotFound(_) => "APP-0020",
            Self::ConcurrentModification { .. } => "APP-0030",
            Self::RecurringFolderMove => "APP-0040",
            Self::Permission(_) => "APP-0050",
        }
    }
}

/// Convenience alias used throughout appoint-engine.
pub type Result<T> = std::result::Result<T, EngineError>;
