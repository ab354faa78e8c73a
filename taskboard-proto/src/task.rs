//! Task domain types shared by the board server and its clients.
//!
//! A [`Task`] lives on exactly one board (a string partition key) and is
//! versioned by its [`Timestamp`]-valued `last_edited` field, which doubles as
//! the optimistic-concurrency token clients echo back on edits.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Column names that may not be used as task titles.
pub const RESERVED_TITLES: [&str; 3] = ["Todo", "In Progress", "Done"];

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns a timestamp strictly later than `previous`.
    ///
    /// Uses the wall clock when it is ahead, otherwise `previous + 1ms`, so a
    /// record's version keeps increasing across same-millisecond writes and
    /// clock steps backwards.
    #[must_use]
    pub fn advanced_past(previous: Self) -> Self {
        Self::now().max(Self(previous.0.saturating_add(1)))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Board column a task sits in.
///
/// Every transition between columns is allowed; cards can be dragged to any
/// column directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not started. Initial status of every task.
    #[default]
    Todo,
    /// Actively being worked on.
    #[serde(rename = "In Progress")]
    InProgress,
    /// Completed. Done tasks do not count towards a user's load.
    Done,
}

impl TaskStatus {
    /// Returns the column name shown on the board.
    #[must_use]
    pub const fn column_name(self) -> &'static str {
        match self {
            Self::Todo => "Todo",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
        }
    }

    /// Whether a task in this column still counts as active work.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Done)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column_name())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Todo" => Ok(Self::Todo),
            "In Progress" => Ok(Self::InProgress),
            "Done" => Ok(Self::Done),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority, the default for new tasks.
    #[default]
    Medium,
    /// High priority.
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// A task card on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier (UUID v7, time-ordered).
    pub id: TaskId,
    /// Board this task belongs to.
    pub board_id: String,
    /// Title, unique within the board.
    pub title: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Column the task currently sits in.
    pub status: TaskStatus,
    /// Task priority.
    pub priority: Priority,
    /// User id of the assignee, if any.
    pub assigned_user: Option<String>,
    /// When the task was created.
    pub created_at: Timestamp,
    /// Version token, advanced on every mutation.
    pub last_edited: Timestamp,
}

impl Task {
    /// Creates a fresh `Todo` task stamped with the current time.
    #[must_use]
    pub fn new(
        board_id: &str,
        title: &str,
        description: Option<String>,
        priority: Priority,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: TaskId::new(),
            board_id: board_id.to_string(),
            title: title.to_string(),
            description,
            status: TaskStatus::Todo,
            priority,
            assigned_user: None,
            created_at: now,
            last_edited: now,
        }
    }

    /// Whether this task counts towards its assignee's active load.
    #[must_use]
    pub const fn is_active_assignment(&self) -> bool {
        self.status.is_active() && self.assigned_user.is_some()
    }
}

/// Names of task fields that can appear in a [`TaskPatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskField {
    /// The title field.
    Title,
    /// The description field.
    Description,
    /// The status field.
    Status,
    /// The priority field.
    Priority,
    /// The assignee field.
    AssignedUser,
}

/// A shallow partial update. Every field that is present replaces the stored
/// value.
///
/// The nullable fields are doubly optional: an absent key leaves the field
/// alone, while an explicit `null` (`Some(None)`) clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description; `Some(None)` clears it.
    #[serde(
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    /// New column.
    pub status: Option<TaskStatus>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New assignee user id; `Some(None)` unassigns the task.
    #[serde(
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub assigned_user: Option<Option<String>>,
}

/// Marks a key that appeared in the input as present, even when its value is
/// `null`. Absent keys never reach this and fall back to `None`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TaskPatch {
    /// Returns the fields this patch carries, in declaration order. A field
    /// sent as `null` is carried.
    #[must_use]
    pub fn fields(&self) -> Vec<TaskField> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push(TaskField::Title);
        }
        if self.description.is_some() {
            fields.push(TaskField::Description);
        }
        if self.status.is_some() {
            fields.push(TaskField::Status);
        }
        if self.priority.is_some() {
            fields.push(TaskField::Priority);
        }
        if self.assigned_user.is_some() {
            fields.push(TaskField::AssignedUser);
        }
        fields
    }

    /// Returns the `(from, to)` column transition this patch causes on `task`,
    /// or `None` when the status is absent or unchanged.
    #[must_use]
    pub fn column_transition(&self, task: &Task) -> Option<(TaskStatus, TaskStatus)> {
        self.status
            .filter(|to| *to != task.status)
            .map(|to| (task.status, to))
    }

    /// Overwrites every field present in the patch onto `task`.
    ///
    /// `last_edited` is left untouched; the caller stamps the new version.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(assignee) = &self.assigned_user {
            task.assigned_user.clone_from(assignee);
        }
    }
}
