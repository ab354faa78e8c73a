//! Board server core: websocket sessions, router assembly and startup.
//!
//! Viewers open a websocket on `/ws`, then join one or more boards. Every
//! session gets an outbound queue registered with the [`BoardNotifier`]; a
//! dedicated writer task drains it onto the socket while the reader task
//! handles join/leave frames. Mutations arrive over the HTTP routes in
//! [`crate::api`] and reach sessions only through the notifier.
//!
//! [`BoardNotifier`]: crate::notifier::BoardNotifier

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use taskboard_proto::session::{self, BoardEvent, ClientMessage, ServerMessage};
use tokio::sync::mpsc;

use crate::api::{self, AppState, SharedState};
use crate::notifier::SessionId;

/// Handles an upgraded websocket connection for a single viewer.
///
/// The connection lifecycle:
/// 1. Register a session with the notifier.
/// 2. Forward board events and replies to the socket from a writer task.
/// 3. Process `JoinBoard` / `LeaveBoard` frames until the socket closes.
/// 4. On disconnect, drop the session from every board.
pub async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<BoardEvent>();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let notifier = Arc::clone(state.service.notifier());
    let session = notifier.connect(event_tx);
    tracing::info!(session_id = %session, "session connected");

    // Writer task: board events and direct replies share the socket.
    let mut write_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                Some(event) = event_rx.recv() => ServerMessage::Event(event),
                Some(reply) = reply_rx.recv() => reply,
                else => break,
            };
            if let Err(e) = send_server_msg(&mut ws_sender, &msg).await {
                tracing::warn!(session_id = %session, error = %e, "websocket write failed");
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    let reply = handle_client_frame(session, &data, &reader_state);
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
                Message::Close(_) => {
                    tracing::debug!(session_id = %session, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    notifier.disconnect(session);
    tracing::info!(session_id = %session, "session disconnected");
}

/// Processes one binary frame from a session and returns the reply.
fn handle_client_frame(session: SessionId, data: &[u8], state: &AppState) -> ServerMessage {
    if data.len() > state.max_frame_size {
        tracing::warn!(
            session_id = %session,
            size = data.len(),
            max = state.max_frame_size,
            "frame exceeds size limit"
        );
        return ServerMessage::Error {
            reason: format!(
                "frame too large: {} bytes (max {})",
                data.len(),
                state.max_frame_size
            ),
        };
    }

    let msg = match session::decode_client(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(session_id = %session, error = %e, "failed to decode frame");
            return ServerMessage::Error {
                reason: format!("malformed frame: {e}"),
            };
        }
    };

    let notifier = state.service.notifier();
    match msg {
        ClientMessage::JoinBoard { board_id } | ClientMessage::LeaveBoard { board_id }
            if board_id.trim().is_empty() =>
        {
            ServerMessage::Error {
                reason: "board id cannot be empty".to_string(),
            }
        }
        ClientMessage::JoinBoard { board_id } => {
            if notifier.subscribe(session, &board_id) {
                tracing::info!(session_id = %session, board_id = %board_id, "joined board");
                ServerMessage::Joined { board_id }
            } else {
                ServerMessage::Error {
                    reason: "session is not connected".to_string(),
                }
            }
        }
        ClientMessage::LeaveBoard { board_id } => {
            notifier.unsubscribe(session, &board_id);
            tracing::info!(session_id = %session, board_id = %board_id, "left board");
            ServerMessage::Left { board_id }
        }
    }
}

/// Encodes and sends a server message on a websocket sender.
async fn send_server_msg(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &ServerMessage,
) -> Result<(), String> {
    let bytes = session::encode_server(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("websocket send error: {e}"))
}

/// Assembles the full application router: HTTP API, `/ws` and `/health`.
pub fn router(state: SharedState) -> axum::Router {
    api::api_router()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state)
}

/// Starts a server with in-memory storage on the given address and returns
/// the bound address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(AppState::in_memory())).await
}

/// Starts the server with pre-built [`AppState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: SharedState,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "board server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a websocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<SharedState>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
