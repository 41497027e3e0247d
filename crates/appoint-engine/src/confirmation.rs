//! Per-participant confirmation state and its inheritance rules.
//!
//! Each internal user on an appointment carries an independent confirmation
//! value. Updating unrelated fields must never reset anyone else's status;
//! the only reset happens when a change exception is carved out with a time
//! that differs from the occurrence it replaces.

use serde::{Deserialize, Serialize};

use crate::appointment::{Participant, UserParticipant};
use crate::error::{EngineError, Result};
use crate::types::UserId;

/// Confirmation status of one user on one appointment object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmStatus {
    /// No statement yet.
    #[default]
    None,
    Accept,
    Decline,
    Tentative,
}

/// Resolve a participant list to user entries, carrying over confirmation
/// state for users that stay on the appointment and starting new ones at
/// [`ConfirmStatus::None`].
#[must_use]
pub fn merge_participants(
    existing: &[UserParticipant],
    participants: &[Participant],
) -> Vec<UserParticipant> {
    participants
        .iter()
        .filter_map(|p| match p {
            Participant::User(id) => Some(*id),
            Participant::Resource(_) => None,
        })
        .map(|user_id| {
            existing
                .iter()
                .find(|u| u.user_id == user_id)
                .cloned()
                .unwrap_or_else(|| UserParticipant::new(user_id))
        })
        .collect()
}

/// Confirmation state for a freshly materialized change exception.
///
/// When the exception keeps the occurrence's inherited time, everyone's
/// prior statement carries over. When the time materially differs, the
/// statement no longer applies: every participant except the acting one is
/// reset to [`ConfirmStatus::None`] and their messages are cleared.
#[must_use]
pub fn inherit_confirmations(
    master_users: &[UserParticipant],
    acting: UserId,
    time_changed: bool,
) -> Vec<UserParticipant> {
    master_users
        .iter()
        .map(|u| {
            if time_changed && u.user_id != acting {
                UserParticipant::new(u.user_id)
            } else {
                u.clone()
            }
        })
        .collect()
}

/// Record one user's confirmation on an appointment's user list.
///
/// # Errors
///
/// [`EngineError::Permission`] when the user is not a participant.
pub fn apply_confirmation(
    users: &mut [UserParticipant],
    user: UserId,
    status: ConfirmStatus,
    message: Option<String>,
) -> Result<()> {
    let entry = users
        .iter_mut()
        .find(|u| u.user_id == user)
        .ok_or_else(|| {
            EngineError::Permission(format!("user {user} is not a participant"))
        })?;
    entry.confirmation = status;
    entry.message = message;
    Ok(())
}
