//! Optimistic-concurrency check for task edits.
//!
//! An edit carries the `last_edited` value the caller last observed. If the
//! stored record has moved on since then, the edit is stale and the caller is
//! handed the current record instead of silently overwriting it.

use taskboard_proto::task::{Task, Timestamp};

/// Outcome of a staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCheck<'a> {
    /// The edit may proceed.
    Ok,
    /// The edit raced a newer committed version.
    Conflict {
        /// The authoritative record the caller should reconcile against.
        latest: &'a Task,
    },
}

impl ConflictCheck<'_> {
    /// Returns `true` if the edit may proceed.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Returns `true` when an edit observed at `client` is older than `server`.
///
/// An absent token skips the check. Equal timestamps are the same version and
/// pass.
#[must_use]
pub fn is_stale(client: Option<Timestamp>, server: Timestamp) -> bool {
    client.is_some_and(|observed| observed < server)
}

/// Checks a caller's staleness token against the stored task.
#[must_use]
pub fn check_conflict(client_last_edited: Option<Timestamp>, stored: &Task) -> ConflictCheck<'_> {
    if is_stale(client_last_edited, stored.last_edited) {
        ConflictCheck::Conflict { latest: stored }
    } else {
        ConflictCheck::Ok
    }
}
