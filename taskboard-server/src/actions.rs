//! Append-only activity log of board mutations.
//!
//! [`ActionLog`] is the seam to the backing store. [`InMemoryActionLog`] keeps
//! a per-board queue capped at a retention limit; once the cap is exceeded the
//! oldest entry is evicted. Entries are never edited.
//!
//! `created_at` is stamped when the entry is appended, under the board lock,
//! so a board's queue is ordered by time as well as by arrival.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use taskboard_proto::action::Action;
use taskboard_proto::task::Timestamp;
use tokio::sync::RwLock;

use crate::store::StoreError;

/// Default number of actions kept per board before FIFO eviction.
pub const DEFAULT_RETENTION: usize = 10_000;

/// Persistence interface for the activity log.
#[async_trait]
pub trait ActionLog: Send + Sync {
    /// Appends an action, returning it as stored. The stored `created_at`
    /// is never earlier than that of the board's previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn append(&self, action: Action) -> Result<Action, StoreError>;

    /// Returns up to `limit` of a board's actions, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on backend failure.
    async fn list_by_board(&self, board_id: &str, limit: usize) -> Result<Vec<Action>, StoreError>;
}

/// In-memory per-board action log with FIFO retention.
pub struct InMemoryActionLog {
    boards: RwLock<HashMap<String, VecDeque<Action>>>,
    retention: usize,
}

impl Default for InMemoryActionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryActionLog {
    /// Creates a new, empty log with the default retention limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Creates a new, empty log keeping at most `retention` actions per board.
    #[must_use]
    pub fn with_retention(retention: usize) -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
            retention: retention.max(1),
        }
    }

    /// Returns the number of actions currently kept for a board.
    pub async fn board_len(&self, board_id: &str) -> usize {
        let boards = self.boards.read().await;
        boards.get(board_id).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl ActionLog for InMemoryActionLog {
    async fn append(&self, mut action: Action) -> Result<Action, StoreError> {
        let mut boards = self.boards.write().await;
        let queue = boards.entry(action.board_id.clone()).or_default();
        action.created_at = queue
            .back()
            .map_or_else(Timestamp::now, |last| Timestamp::now().max(last.created_at));
        queue.push_back(action.clone());
        if queue.len() > self.retention {
            queue.pop_front();
        }
        drop(boards);
        Ok(action)
    }

    async fn list_by_board(&self, board_id: &str, limit: usize) -> Result<Vec<Action>, StoreError> {
        let boards = self.boards.read().await;
        Ok(boards
            .get(board_id)
            .map(|q| q.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
