//! Identifier newtypes and small shared value types.
//!
//! Identifiers are plain integers on the wire, so they stay integer newtypes
//! here rather than opaque handles. `Timestamp` is the optimistic-concurrency
//! token handed out by the store; callers must echo the last observed value
//! on every mutation.

use serde::{Deserialize, Serialize};

/// Identifier of an appointment object (master, single, or change exception).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

/// Identifier of a calendar folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(pub u32);

/// Identifier of an internal user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u32);

/// Identifier of a bookable resource (room, projector, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u32);

/// Optimistic-concurrency token.
///
/// The store increments a logical clock on every committed mutation and
/// stamps the affected objects with the new value. A mutation carrying a
/// token older than the stored one is rejected as a concurrent modification
/// instead of silently overwriting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Free/busy classification of an appointment.
///
/// Only time-reserving values participate in conflict detection; `Free`
/// never conflicts, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShownAs {
    #[default]
    Reserved,
    Temporary,
    Absent,
    Free,
}

impl ShownAs {
    /// Whether this classification blocks the covered time interval.
    #[must_use]
    pub const fn reserves_time(self) -> bool {
        !matches!(self, Self::Free)
    }
}
