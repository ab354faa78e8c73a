//! Websocket session protocol between board viewers and the server.
//!
//! Clients join and leave boards; the server pushes [`BoardEvent`]s to every
//! session that has joined the affected board. Frames are binary and
//! postcard-encoded.

use serde::{Deserialize, Serialize};

use crate::action::ActionId;
use crate::task::TaskId;

/// Error type for session frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A change notification scoped to one board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardEvent {
    /// Something on the board changed; viewers should refetch the task list.
    TasksChanged {
        /// Affected board.
        board_id: String,
    },
    /// A specific task changed or was deleted. Editors of that task use this
    /// to warn about edits made elsewhere.
    TaskUpdated {
        /// Affected board.
        board_id: String,
        /// Task that changed.
        task_id: TaskId,
    },
    /// A new entry was appended to the board's activity feed.
    ActionLogged {
        /// Affected board.
        board_id: String,
        /// The appended action.
        action_id: ActionId,
    },
}

impl BoardEvent {
    /// Returns the board this event is scoped to.
    #[must_use]
    pub fn board_id(&self) -> &str {
        match self {
            Self::TasksChanged { board_id }
            | Self::TaskUpdated { board_id, .. }
            | Self::ActionLogged { board_id, .. } => board_id,
        }
    }

    /// Returns the event name as exposed to clients.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TasksChanged { .. } => "tasksChanged",
            Self::TaskUpdated { .. } => "taskUpdated",
            Self::ActionLogged { .. } => "actionLogged",
        }
    }
}

/// Messages sent from a viewer to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Start receiving events for a board.
    JoinBoard {
        /// Board to subscribe to.
        board_id: String,
    },
    /// Stop receiving events for a board.
    LeaveBoard {
        /// Board to unsubscribe from.
        board_id: String,
    },
}

/// Messages sent from the server to a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Subscription confirmed.
    Joined {
        /// Board now subscribed.
        board_id: String,
    },
    /// Unsubscription confirmed.
    Left {
        /// Board no longer subscribed.
        board_id: String,
    },
    /// A board change notification.
    Event(BoardEvent),
    /// The server rejected a client frame.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

/// Encodes a [`ClientMessage`] into bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the message cannot be serialized.
pub fn encode_client(msg: &ClientMessage) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(msg).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ClientMessage`] from bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode_client(bytes: &[u8]) -> Result<ClientMessage, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`ServerMessage`] into bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the message cannot be serialized.
pub fn encode_server(msg: &ServerMessage) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(msg).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ServerMessage`] from bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode_server(bytes: &[u8]) -> Result<ServerMessage, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
