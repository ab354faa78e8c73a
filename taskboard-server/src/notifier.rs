//! Board-scoped fan-out of change events to connected sessions.
//!
//! Each connected viewer is a session with its own unbounded outbound queue.
//! Sessions join boards ("rooms"); [`BoardNotifier::broadcast`] pushes an
//! event onto the queue of every session joined to the event's board. Pushing
//! never blocks, so a slow or dead socket cannot stall the broadcaster or the
//! mutation that triggered it.
//!
//! Membership is process-wide state, empty at startup, guarded by a single
//! lock so joins and leaves racing a broadcast see a consistent snapshot.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use taskboard_proto::session::BoardEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound queue of a session.
pub type EventSender = mpsc::UnboundedSender<BoardEvent>;

/// Identifier of one connected session (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new session identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct Membership {
    /// Session id -> outbound queue.
    sessions: HashMap<SessionId, EventSender>,
    /// Board id -> subscribed sessions.
    boards: HashMap<String, HashSet<SessionId>>,
    /// Session id -> boards it joined, for cleanup on disconnect.
    joined: HashMap<SessionId, HashSet<String>>,
}

impl Membership {
    fn leave(&mut self, session: SessionId, board_id: &str) -> bool {
        let removed = self
            .boards
            .get_mut(board_id)
            .is_some_and(|members| members.remove(&session));
        if self.boards.get(board_id).is_some_and(HashSet::is_empty) {
            self.boards.remove(board_id);
        }
        if let Some(boards) = self.joined.get_mut(&session) {
            boards.remove(board_id);
        }
        removed
    }

    fn drop_session(&mut self, session: SessionId) -> bool {
        let existed = self.sessions.remove(&session).is_some();
        for board_id in self.joined.remove(&session).unwrap_or_default() {
            if let Some(members) = self.boards.get_mut(&board_id) {
                members.remove(&session);
                if members.is_empty() {
                    self.boards.remove(&board_id);
                }
            }
        }
        existed
    }
}

/// Per-board subscription registry and event broadcaster.
#[derive(Default)]
pub struct BoardNotifier {
    inner: RwLock<Membership>,
}

impl BoardNotifier {
    /// Creates a notifier with no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session that will receive events through `sender`.
    pub fn connect(&self, sender: EventSender) -> SessionId {
        let session = SessionId::new();
        self.inner.write().sessions.insert(session, sender);
        session
    }

    /// Removes a session and all of its board subscriptions.
    ///
    /// Returns `true` if the session was connected.
    pub fn disconnect(&self, session: SessionId) -> bool {
        self.inner.write().drop_session(session)
    }

    /// Subscribes a session to a board. Idempotent.
    ///
    /// Returns `true` if the session is connected and now subscribed.
    pub fn subscribe(&self, session: SessionId, board_id: &str) -> bool {
        let mut inner = self.inner.write();
        if !inner.sessions.contains_key(&session) {
            return false;
        }
        inner
            .boards
            .entry(board_id.to_string())
            .or_default()
            .insert(session);
        inner
            .joined
            .entry(session)
            .or_default()
            .insert(board_id.to_string());
        true
    }

    /// Unsubscribes a session from a board. Idempotent.
    ///
    /// Returns `true` if the session was subscribed.
    pub fn unsubscribe(&self, session: SessionId, board_id: &str) -> bool {
        self.inner.write().leave(session, board_id)
    }

    /// Delivers `event` to every session subscribed to its board.
    ///
    /// Fire-and-forget: a session whose queue is closed is dropped from the
    /// registry and the remaining sessions still receive the event. Returns
    /// the number of sessions the event was queued for.
    pub fn broadcast(&self, event: &BoardEvent) -> usize {
        let board_id = event.board_id();
        let targets: Vec<(SessionId, EventSender)> = {
            let inner = self.inner.read();
            inner
                .boards
                .get(board_id)
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|s| inner.sessions.get(s).map(|tx| (*s, tx.clone())))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (session, sender) in targets {
            if sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(session);
            }
        }

        if !dead.is_empty() {
            let mut inner = self.inner.write();
            for session in dead {
                tracing::debug!(
                    session_id = %session,
                    board_id = %board_id,
                    "dropping closed session"
                );
                inner.drop_session(session);
            }
        }

        tracing::trace!(
            board_id = %board_id,
            event = event.name(),
            delivered = delivered,
            "broadcast board event"
        );
        delivered
    }

    /// Returns the number of sessions subscribed to a board.
    #[must_use]
    pub fn subscriber_count(&self, board_id: &str) -> usize {
        self.inner.read().boards.get(board_id).map_or(0, HashSet::len)
    }

    /// Returns `true` if the session is subscribed to the board.
    #[must_use]
    pub fn is_subscribed(&self, session: SessionId, board_id: &str) -> bool {
        self.inner
            .read()
            .boards
            .get(board_id)
            .is_some_and(|members| members.contains(&session))
    }

    /// Returns the number of connected sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }
}
