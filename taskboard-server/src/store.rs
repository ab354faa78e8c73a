//! Durable task records, queryable by board.
//!
//! [`TaskStore`] is the seam to the persistence engine. The mutation service
//! only relies on the operations listed here, including an atomic
//! [`TaskStore::compare_and_swap`] keyed on `last_edited` that closes the
//! read/compare/write window of optimistic edits.
//!
//! [`InMemoryTaskStore`] is the bundled engine: records are lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use taskboard_proto::task::{Task, TaskId, TaskStatus, Timestamp};
use tokio::sync::RwLock;

/// Errors surfaced by a task store or action log backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Another task on the same board already holds this title.
    #[error("a task titled {title:?} already exists on board {board_id}")]
    DuplicateTitle {
        /// Board the collision happened on.
        board_id: String,
        /// The contested title.
        title: String,
    },
    /// The backend failed to read or write.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Optional filters for board listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Only tasks in this column.
    pub status: Option<TaskStatus>,
    /// Only tasks assigned to this user.
    pub assigned_user: Option<String>,
}

impl TaskFilter {
    /// Returns `true` if `task` passes every set filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|s| task.status == s)
            && self
                .assigned_user
                .as_deref()
                .is_none_or(|u| task.assigned_user.as_deref() == Some(u))
    }
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Swap {
    /// The replacement was stored.
    Written(Task),
    /// The stored version no longer matched; nothing was written.
    Stale(Task),
    /// No task with that id exists.
    Missing,
}

/// Persistence interface the mutation service needs.
///
/// Board listings are ordered by `(created_at, id)`, which is the stable
/// enumeration the balancer's first-seen tie-break relies on.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a new task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateTitle`] if the title is taken on the
    /// board, or [`StoreError::Backend`] on backend failure.
    async fn insert(&self, task: Task) -> Result<Task, StoreError>;

    /// Looks a task up by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Looks a task up by its board and exact title.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn find_by_board_and_title(
        &self,
        board_id: &str,
        title: &str,
    ) -> Result<Option<Task>, StoreError>;

    /// Lists a board's tasks matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn find_by_board(
        &self,
        board_id: &str,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, StoreError>;

    /// Replaces a task only if its stored `last_edited` equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateTitle`] if the replacement's title is
    /// held by another task on the board, or [`StoreError::Backend`] on
    /// backend failure.
    async fn compare_and_swap(
        &self,
        id: &TaskId,
        expected: Timestamp,
        replacement: Task,
    ) -> Result<Swap, StoreError>;

    /// Removes a task, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn delete_by_id(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Returns the distinct assignees on a board, in listing order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn distinct_assigned_users(&self, board_id: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory task store.
///
/// Thread-safe via [`RwLock`]. Every write, including the title uniqueness
/// check, happens under a single write-lock acquisition.
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of stored tasks across all boards.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Returns `true` if no tasks are stored.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

/// Returns a board's tasks in `(created_at, id)` order.
fn board_listing<'a>(tasks: &'a HashMap<TaskId, Task>, board_id: &str) -> Vec<&'a Task> {
    let mut listing: Vec<&Task> = tasks.values().filter(|t| t.board_id == board_id).collect();
    listing.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    listing
}

/// Returns `true` if a task other than `except` holds `title` on the board.
fn title_taken(
    tasks: &HashMap<TaskId, Task>,
    board_id: &str,
    title: &str,
    except: Option<&TaskId>,
) -> bool {
    tasks
        .values()
        .any(|t| t.board_id == board_id && t.title == title && Some(&t.id) != except)
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        if title_taken(&tasks, &task.board_id, &task.title, None) {
            return Err(StoreError::DuplicateTitle {
                board_id: task.board_id,
                title: task.title,
            });
        }
        tasks.insert(task.id.clone(), task.clone());
        drop(tasks);
        Ok(task)
    }

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(id).cloned())
    }

    async fn find_by_board_and_title(
        &self,
        board_id: &str,
        title: &str,
    ) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .find(|t| t.board_id == board_id && t.title == title)
            .cloned())
    }

    async fn find_by_board(
        &self,
        board_id: &str,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(board_listing(&tasks, board_id)
            .into_iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn compare_and_swap(
        &self,
        id: &TaskId,
        expected: Timestamp,
        replacement: Task,
    ) -> Result<Swap, StoreError> {
        let mut tasks = self.tasks.write().await;
        let Some(current) = tasks.get(id) else {
            return Ok(Swap::Missing);
        };
        if current.last_edited != expected {
            return Ok(Swap::Stale(current.clone()));
        }
        if title_taken(&tasks, &replacement.board_id, &replacement.title, Some(id)) {
            return Err(StoreError::DuplicateTitle {
                board_id: replacement.board_id,
                title: replacement.title,
            });
        }
        tasks.insert(id.clone(), replacement.clone());
        drop(tasks);
        Ok(Swap::Written(replacement))
    }

    async fn delete_by_id(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks.remove(id))
    }

    async fn distinct_assigned_users(&self, board_id: &str) -> Result<Vec<String>, StoreError> {
        let tasks = self.tasks.read().await;
        let mut users: Vec<String> = Vec::new();
        for task in board_listing(&tasks, board_id) {
            if let Some(user) = &task.assigned_user
                && !users.contains(user)
            {
                users.push(user.clone());
            }
        }
        Ok(users)
    }
}
