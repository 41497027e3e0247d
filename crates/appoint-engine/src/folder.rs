//! Folders, permission grants, and the folder-move validator.
//!
//! A folder is private or public; "shared" is a private folder carrying
//! grants for users other than the owner. Grants are per-user flags in the
//! style of object-control lists: folder visibility, create/read/write/
//! delete, and an admin override.

use serde::{Deserialize, Serialize};

use crate::appointment::Appointment;
use crate::error::{EngineError, Result};
use crate::types::{FolderId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderKind {
    Private,
    Public,
}

/// Per-user grant on a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub user_id: UserId,
    pub folder_visible: bool,
    pub create_objects: bool,
    pub read_all: bool,
    pub write_all: bool,
    pub delete_all: bool,
    pub admin: bool,
}

impl Permission {
    /// Full grant, as held implicitly by the folder owner.
    #[must_use]
    pub const fn full(user_id: UserId) -> Self {
        Self {
            user_id,
            folder_visible: true,
            create_objects: true,
            read_all: true,
            write_all: true,
            delete_all: true,
            admin: true,
        }
    }

    /// Read-only grant.
    #[must_use]
    pub const fn reader(user_id: UserId) -> Self {
        Self {
            user_id,
            folder_visible: true,
            create_objects: false,
            read_all: true,
            write_all: false,
            delete_all: false,
            admin: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub owner: UserId,
    pub kind: FolderKind,
    pub permissions: Vec<Permission>,
}

impl Folder {
    /// A private folder granting anything to a non-owner is shared.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.kind == FolderKind::Private
            && self.permissions.iter().any(|p| p.user_id != self.owner)
    }

    fn grant(&self, user: UserId) -> Option<&Permission> {
        self.permissions.iter().find(|p| p.user_id == user)
    }

    #[must_use]
    pub fn may_read(&self, user: UserId) -> bool {
        user == self.owner || self.grant(user).is_some_and(|g| g.admin || g.read_all)
    }

    #[must_use]
    pub fn may_create(&self, user: UserId) -> bool {
        user == self.owner
            || self
                .grant(user)
                .is_some_and(|g| g.admin || g.create_objects)
    }

    #[must_use]
    pub fn may_write(&self, user: UserId) -> bool {
        user == self.owner || self.grant(user).is_some_and(|g| g.admin || g.write_all)
    }

    #[must_use]
    pub fn may_delete(&self, user: UserId) -> bool {
        user == self.owner || self.grant(user).is_some_and(|g| g.admin || g.delete_all)
    }
}

/// Participant rewriting required by a validated move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveEffect {
    /// Attendee list stays as it is.
    KeepParticipants,
    /// Destination is someone else's personal folder: the original owner
    /// stays on the appointment as an added participant instead of the
    /// attendee list being replaced.
    AddOwnerAsParticipant,
}

/// Decide whether `appointment` may relocate from `source` to `dest`.
///
/// A recurring master with any exception is pinned to its folder; a change
/// exception may only move between folders of the same owner.
///
/// # Errors
///
/// [`EngineError::RecurringFolderMove`] for series with exceptions,
/// [`EngineError::Permission`] on missing rights.
pub fn validate_move(
    appointment: &Appointment,
    acting: UserId,
    source: &Folder,
    dest: &Folder,
) -> Result<MoveEffect> {
    if appointment.is_master() && appointment.has_exceptions() {
        return Err(EngineError::RecurringFolderMove);
    }
    if appointment.is_change_exception() && source.owner != dest.owner {
        return Err(EngineError::Permission(
            "a series exception can only move between folders of the same owner".to_string(),
        ));
    }
    if !source.may_delete(acting) {
        return Err(EngineError::Permission(format!(
            "user {acting} may not remove objects from folder {}",
            source.id
        )));
    }
    if !dest.may_create(acting) {
        return Err(EngineError::Permission(format!(
            "user {acting} may not create objects in folder {}",
            dest.id
        )));
    }

    if dest.kind == FolderKind::Private && dest.owner != appointment.organizer {
        Ok(MoveEffect::AddOwnerAsParticipant)
    } else {
        Ok(MoveEffect::KeepParticipants)
    }
}
