//! Task mutation service: validation, conflict detection, persistence,
//! activity logging and change notification for every board mutation.
//!
//! Each mutation is one conditional write against the [`TaskStore`]. Logging
//! the action and broadcasting events happen after the write commits and are
//! best effort: a failure there is logged and never fails the mutation.
//! Rejected mutations write nothing.
//!
//! Writes go through [`TaskStore::compare_and_swap`] keyed on the version the
//! service just read. If another writer commits in between, the
//! read/check/merge cycle re-runs against the newer record, so a caller's
//! staleness token is always checked against the version actually replaced.

use std::sync::Arc;

use taskboard_proto::action::{Action, ActionDetail, ActionFeedEntry, UserProfile};
use taskboard_proto::session::BoardEvent;
use taskboard_proto::task::{
    MAX_TASK_TITLE_LENGTH, Priority, RESERVED_TITLES, Task, TaskId, TaskPatch, Timestamp,
};

use crate::actions::ActionLog;
use crate::balancer;
use crate::conflict::{self, ConflictCheck};
use crate::notifier::BoardNotifier;
use crate::store::{StoreError, Swap, TaskFilter, TaskStore};
use crate::users::UserDirectory;

/// Default number of activity feed entries returned per page.
pub const DEFAULT_FEED_LIMIT: usize = 20;

/// Default upper bound on a requested activity feed page size.
pub const DEFAULT_MAX_FEED_LIMIT: usize = 100;

/// How many times a write is retried after losing a compare-and-swap race.
const MAX_SWAP_ATTEMPTS: usize = 8;

/// Errors returned by mutation operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// Malformed or forbidden input.
    #[error("{0}")]
    Validation(String),
    /// Another task on the board already has this title.
    #[error("task title must be unique per board: {title:?}")]
    DuplicateTitle {
        /// The contested title.
        title: String,
    },
    /// The referenced task does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The edit was based on an outdated version of the task.
    #[error("edit conflict: task has been updated by someone else")]
    Conflict {
        /// The current server-side record.
        latest: Box<Task>,
    },
    /// The underlying store failed.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<StoreError> for MutationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateTitle { title, .. } => Self::DuplicateTitle { title },
            StoreError::Backend(reason) => Self::Persistence(reason),
        }
    }
}

/// Trims and validates a task title.
///
/// # Errors
///
/// Returns [`MutationError::Validation`] if the trimmed title is empty, too
/// long, or exactly matches a column name.
pub fn validate_title(title: &str) -> Result<String, MutationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(MutationError::Validation(
            "task title cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(MutationError::Validation(format!(
            "task title too long (max {MAX_TASK_TITLE_LENGTH} characters)"
        )));
    }
    if RESERVED_TITLES.contains(&trimmed) {
        return Err(MutationError::Validation(
            "task title cannot be a column name".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_board_id(board_id: &str) -> Result<(), MutationError> {
    if board_id.trim().is_empty() {
        return Err(MutationError::Validation(
            "board id cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Orchestrates every mutating board operation.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    actions: Arc<dyn ActionLog>,
    notifier: Arc<BoardNotifier>,
    users: Arc<UserDirectory>,
}

impl TaskService {
    /// Creates a service over the given store, action log and notifier, with
    /// an empty user directory.
    #[must_use]
    pub fn new(
        store: Arc<dyn TaskStore>,
        actions: Arc<dyn ActionLog>,
        notifier: Arc<BoardNotifier>,
    ) -> Self {
        Self {
            store,
            actions,
            notifier,
            users: Arc::new(UserDirectory::new()),
        }
    }

    /// Replaces the user directory used to join usernames.
    #[must_use]
    pub fn with_users(mut self, users: Arc<UserDirectory>) -> Self {
        self.users = users;
        self
    }

    /// Returns the notifier this service broadcasts through.
    #[must_use]
    pub fn notifier(&self) -> &Arc<BoardNotifier> {
        &self.notifier
    }

    /// Lists a board's tasks.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Persistence`] if the store fails.
    pub async fn list(
        &self,
        board_id: &str,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, MutationError> {
        Ok(self.store.find_by_board(board_id, filter).await?)
    }

    /// Creates a task in the `Todo` column.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Validation`] for an empty, oversized or
    /// reserved title, [`MutationError::DuplicateTitle`] if the title is taken
    /// on the board, or [`MutationError::Persistence`] if the store fails.
    pub async fn create(
        &self,
        user: &str,
        board_id: &str,
        title: &str,
        description: Option<String>,
        priority: Priority,
    ) -> Result<Task, MutationError> {
        validate_board_id(board_id)?;
        let title = validate_title(title)?;

        if self
            .store
            .find_by_board_and_title(board_id, &title)
            .await?
            .is_some()
        {
            return Err(MutationError::DuplicateTitle { title });
        }

        let task = self
            .store
            .insert(Task::new(board_id, &title, description, priority))
            .await?;

        tracing::info!(
            user_id = %user,
            board_id = %board_id,
            task_id = %task.id,
            "task created"
        );
        self.record(user, &task, ActionDetail::Add { title }).await;
        Ok(task)
    }

    /// Applies a shallow patch to a task.
    ///
    /// `client_last_edited` is the version the caller last saw; when it is
    /// older than the stored version the patch is rejected with
    /// [`MutationError::Conflict`]. When absent, the patch is applied to
    /// whatever version is current.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::NotFound`], [`MutationError::Conflict`],
    /// [`MutationError::Validation`] or [`MutationError::DuplicateTitle`] for
    /// a bad title in the patch, or [`MutationError::Persistence`].
    pub async fn update(
        &self,
        user: &str,
        task_id: &TaskId,
        patch: TaskPatch,
        client_last_edited: Option<Timestamp>,
    ) -> Result<Task, MutationError> {
        let mut patch = patch;
        if let Some(title) = &patch.title {
            patch.title = Some(validate_title(title)?);
        }

        for _ in 0..MAX_SWAP_ATTEMPTS {
            let current = self.find(task_id).await?;
            if let ConflictCheck::Conflict { latest } =
                conflict::check_conflict(client_last_edited, &current)
            {
                tracing::info!(
                    user_id = %user,
                    task_id = %task_id,
                    stored = %latest.last_edited,
                    "rejecting stale edit"
                );
                return Err(MutationError::Conflict {
                    latest: Box::new(latest.clone()),
                });
            }

            let transition = patch.column_transition(&current);
            let mut next = current.clone();
            patch.apply_to(&mut next);
            next.last_edited = Timestamp::advanced_past(current.last_edited);

            match self
                .store
                .compare_and_swap(task_id, current.last_edited, next)
                .await?
            {
                Swap::Written(task) => {
                    let fields = patch.fields();
                    let detail = match transition {
                        Some((from, to)) => ActionDetail::Move { from, to, fields },
                        None => ActionDetail::Edit { fields },
                    };
                    tracing::info!(
                        user_id = %user,
                        board_id = %task.board_id,
                        task_id = %task.id,
                        kind = %detail.kind(),
                        "task updated"
                    );
                    self.record(user, &task, detail).await;
                    return Ok(task);
                }
                Swap::Stale(_) => {
                    tracing::debug!(task_id = %task_id, "lost update race, retrying");
                }
                Swap::Missing => return Err(MutationError::NotFound(task_id.clone())),
            }
        }

        Err(self.exhausted(task_id).await)
    }

    /// Assigns a task to the least-loaded user on its board.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::NotFound`] if the task does not exist, or
    /// [`MutationError::Persistence`] if the store fails.
    pub async fn smart_assign(&self, user: &str, task_id: &TaskId) -> Result<Task, MutationError> {
        for _ in 0..MAX_SWAP_ATTEMPTS {
            let current = self.find(task_id).await?;
            let board = self
                .store
                .find_by_board(&current.board_id, &TaskFilter::default())
                .await?;
            let assignee = balancer::choose_assignee(&board, user);

            let mut next = current.clone();
            next.assigned_user = Some(assignee.clone());
            next.last_edited = Timestamp::advanced_past(current.last_edited);

            match self
                .store
                .compare_and_swap(task_id, current.last_edited, next)
                .await?
            {
                Swap::Written(task) => {
                    tracing::info!(
                        user_id = %user,
                        board_id = %task.board_id,
                        task_id = %task.id,
                        assigned_to = %assignee,
                        "task smart-assigned"
                    );
                    self.record(
                        user,
                        &task,
                        ActionDetail::SmartAssign {
                            assigned_to: assignee,
                        },
                    )
                    .await;
                    return Ok(task);
                }
                Swap::Stale(_) => {
                    tracing::debug!(task_id = %task_id, "lost assign race, retrying");
                }
                Swap::Missing => return Err(MutationError::NotFound(task_id.clone())),
            }
        }

        Err(self.exhausted(task_id).await)
    }

    /// Deletes a task, returning the removed record.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::NotFound`] if the task does not exist, or
    /// [`MutationError::Persistence`] if the store fails.
    pub async fn delete(&self, user: &str, task_id: &TaskId) -> Result<Task, MutationError> {
        let task = self
            .store
            .delete_by_id(task_id)
            .await?
            .ok_or_else(|| MutationError::NotFound(task_id.clone()))?;

        tracing::info!(
            user_id = %user,
            board_id = %task.board_id,
            task_id = %task.id,
            "task deleted"
        );
        self.record(
            user,
            &task,
            ActionDetail::Delete {
                title: task.title.clone(),
            },
        )
        .await;
        Ok(task)
    }

    /// Returns up to `limit` of a board's actions, newest first, joined with
    /// the acting user's username.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Persistence`] if the log fails.
    pub async fn feed(
        &self,
        board_id: &str,
        limit: usize,
    ) -> Result<Vec<ActionFeedEntry>, MutationError> {
        let actions = self.actions.list_by_board(board_id, limit).await?;
        Ok(actions
            .into_iter()
            .map(|action| {
                let username = self.users.username(&action.user);
                ActionFeedEntry::new(action, username)
            })
            .collect())
    }

    /// Returns the profiles of users with tasks assigned on a board.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Persistence`] if the store fails.
    pub async fn board_users(&self, board_id: &str) -> Result<Vec<UserProfile>, MutationError> {
        let ids = self.store.distinct_assigned_users(board_id).await?;
        Ok(self.users.profiles_for(&ids))
    }

    async fn find(&self, task_id: &TaskId) -> Result<Task, MutationError> {
        self.store
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| MutationError::NotFound(task_id.clone()))
    }

    /// Error for a write that kept losing races: the caller gets the latest
    /// record to reconcile against.
    async fn exhausted(&self, task_id: &TaskId) -> MutationError {
        tracing::warn!(
            task_id = %task_id,
            attempts = MAX_SWAP_ATTEMPTS,
            "giving up on contended write"
        );
        match self.find(task_id).await {
            Ok(latest) => MutationError::Conflict {
                latest: Box::new(latest),
            },
            Err(e) => e,
        }
    }

    /// Appends the action for a committed mutation and notifies the board.
    async fn record(&self, user: &str, task: &Task, detail: ActionDetail) {
        let action = Action::new(&task.board_id, user, task.id.clone(), detail);
        let logged = match self.actions.append(action).await {
            Ok(action) => Some(action.id),
            Err(e) => {
                tracing::warn!(
                    board_id = %task.board_id,
                    task_id = %task.id,
                    error = %e,
                    "failed to append action"
                );
                None
            }
        };

        self.notifier.broadcast(&BoardEvent::TaskUpdated {
            board_id: task.board_id.clone(),
            task_id: task.id.clone(),
        });
        self.notifier.broadcast(&BoardEvent::TasksChanged {
            board_id: task.board_id.clone(),
        });
        if let Some(action_id) = logged {
            self.notifier.broadcast(&BoardEvent::ActionLogged {
                board_id: task.board_id.clone(),
                action_id,
            });
        }
    }
}
