//! Audit-trail entries recorded once per successful board mutation.
//!
//! Actions are append-only. The payload of each entry is an [`ActionDetail`]
//! whose variant determines the [`ActionKind`], so every kind has exactly one
//! payload shape.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{TaskField, TaskId, TaskStatus, Timestamp};

/// Unique identifier for an action log entry (UUID v7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    /// Creates a new time-ordered action identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of mutation an action records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// A task was created.
    Add,
    /// A task's fields were edited without changing its column.
    Edit,
    /// A task changed column.
    Move,
    /// A task was deleted.
    Delete,
    /// A task was assigned by the load balancer.
    SmartAssign,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Edit => write!(f, "edit"),
            Self::Move => write!(f, "move"),
            Self::Delete => write!(f, "delete"),
            Self::SmartAssign => write!(f, "smart-assign"),
        }
    }
}

/// Kind-specific payload of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ActionDetail {
    /// Task created with this title.
    Add {
        /// Title at creation.
        title: String,
    },
    /// Task fields overwritten.
    Edit {
        /// Fields the patch carried.
        fields: Vec<TaskField>,
    },
    /// Task moved between columns (other fields may have changed too).
    Move {
        /// Column before the edit.
        from: TaskStatus,
        /// Column after the edit.
        to: TaskStatus,
        /// Fields the patch carried.
        fields: Vec<TaskField>,
    },
    /// Task removed. The title is kept because the task id no longer resolves.
    Delete {
        /// Title at deletion.
        title: String,
    },
    /// Task assigned to the least-loaded user.
    SmartAssign {
        /// User the balancer picked.
        assigned_to: String,
    },
}

impl ActionDetail {
    /// Returns the action kind this payload belongs to.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Add { .. } => ActionKind::Add,
            Self::Edit { .. } => ActionKind::Edit,
            Self::Move { .. } => ActionKind::Move,
            Self::Delete { .. } => ActionKind::Delete,
            Self::SmartAssign { .. } => ActionKind::SmartAssign,
        }
    }
}

/// An immutable audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Unique action identifier.
    pub id: ActionId,
    /// Board the mutation happened on.
    pub board_id: String,
    /// User id of the caller that performed the mutation.
    pub user: String,
    /// Task the mutation targeted. May no longer resolve after a delete.
    pub task_id: TaskId,
    /// Kind-specific payload.
    pub detail: ActionDetail,
    /// When the action was recorded.
    pub created_at: Timestamp,
}

impl Action {
    /// Creates a new action stamped with the current time.
    #[must_use]
    pub fn new(board_id: &str, user: &str, task_id: TaskId, detail: ActionDetail) -> Self {
        Self {
            id: ActionId::new(),
            board_id: board_id.to_string(),
            user: user.to_string(),
            task_id,
            detail,
            created_at: Timestamp::now(),
        }
    }

    /// Returns the kind of mutation this action records.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        self.detail.kind()
    }
}

/// An action joined with the acting user's display name, as served by the
/// activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFeedEntry {
    /// The recorded action.
    #[serde(flatten)]
    pub action: Action,
    /// Kind of the action, duplicated for feed consumers.
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Username of the acting user, when known.
    pub username: Option<String>,
}

impl ActionFeedEntry {
    /// Joins an action with an optional username.
    #[must_use]
    pub fn new(action: Action, username: Option<String>) -> Self {
        let kind = action.kind();
        Self {
            action,
            kind,
            username,
        }
    }
}

/// Public projection of a registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Opaque user id, as supplied by the identity layer.
    pub id: String,
    /// Unique username.
    pub username: String,
    /// Unique email address.
    pub email: String,
}
