//! Least-loaded assignee selection for smart assign.
//!
//! Load is recomputed from the board's current tasks on every call; nothing
//! is cached between calls, so the counts can never drift from the store.
//!
//! Candidates are the users already holding at least one active (non-`Done`)
//! task on the board. Registered users with no active work are not
//! considered. When nobody holds active work, the requesting user is chosen.

use std::collections::HashMap;

use taskboard_proto::task::Task;

/// Active-task count for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLoad {
    /// User id.
    pub user_id: String,
    /// Number of active tasks assigned to the user on the board.
    pub active_tasks: usize,
}

/// Tallies active assignments per user, in first-seen order over `tasks`.
#[must_use]
pub fn active_load<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Vec<UserLoad> {
    let mut loads: Vec<UserLoad> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();

    for task in tasks {
        if !task.status.is_active() {
            continue;
        }
        let Some(user_id) = task.assigned_user.as_deref() else {
            continue;
        };
        if let Some(&slot) = index.get(user_id) {
            loads[slot].active_tasks += 1;
        } else {
            index.insert(user_id, loads.len());
            loads.push(UserLoad {
                user_id: user_id.to_string(),
                active_tasks: 1,
            });
        }
    }

    loads
}

/// Picks the user with the strictly lowest active-task count on the board.
///
/// Ties go to the user seen first in `board_tasks`. Falls back to `requester`
/// when no user holds an active task.
#[must_use]
pub fn choose_assignee<'a>(
    board_tasks: impl IntoIterator<Item = &'a Task>,
    requester: &str,
) -> String {
    let loads = active_load(board_tasks);
    let mut best: Option<&UserLoad> = None;
    for load in &loads {
        if best.is_none_or(|b| load.active_tasks < b.active_tasks) {
            best = Some(load);
        }
    }
    best.map_or_else(|| requester.to_string(), |b| b.user_id.clone())
}
