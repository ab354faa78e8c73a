//! Integration tests for realtime board sync.
//!
//! Starts an in-process server, connects websocket viewers, mutates tasks
//! through the service and checks which sessions are notified.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use taskboard_proto::session::{self, BoardEvent, ClientMessage, ServerMessage};
use taskboard_proto::task::{Priority, TaskId, TaskPatch, TaskStatus};
use taskboard_server::api::AppState;
use taskboard_server::server;
use taskboard_server::service::MutationError;
use tokio_tungstenite::tungstenite;

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

async fn start() -> (std::net::SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::in_memory());
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start server");
    (addr, state)
}

async fn connect(addr: std::net::SocketAddr) -> Ws {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

async fn ws_send(ws: &mut Ws, msg: &ClientMessage) {
    let bytes = session::encode_client(msg).unwrap();
    ws.send(tungstenite::Message::Binary(bytes.into()))
        .await
        .unwrap();
}

async fn ws_recv(ws: &mut Ws) -> ServerMessage {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for frame")
        .unwrap()
        .unwrap();
    session::decode_server(&msg.into_data()).unwrap()
}

/// Asserts nothing arrives on the socket for a short while.
async fn assert_silent(ws: &mut Ws) {
    let next = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(next.is_err(), "unexpected frame: {next:?}");
}

async fn join(addr: std::net::SocketAddr, board_id: &str) -> Ws {
    let mut ws = connect(addr).await;
    ws_send(
        &mut ws,
        &ClientMessage::JoinBoard {
            board_id: board_id.to_string(),
        },
    )
    .await;
    assert_eq!(
        ws_recv(&mut ws).await,
        ServerMessage::Joined {
            board_id: board_id.to_string()
        }
    );
    ws
}

async fn recv_event(ws: &mut Ws) -> BoardEvent {
    match ws_recv(ws).await {
        ServerMessage::Event(event) => event,
        other => panic!("expected Event, got {other:?}"),
    }
}

/// Expects the full change sequence for one committed mutation, with the
/// logged action being the newest entry in the board's feed.
async fn expect_change(ws: &mut Ws, state: &AppState, board_id: &str, task_id: &TaskId) {
    assert_eq!(
        recv_event(ws).await,
        BoardEvent::TaskUpdated {
            board_id: board_id.into(),
            task_id: task_id.clone(),
        }
    );
    assert_eq!(
        recv_event(ws).await,
        BoardEvent::TasksChanged {
            board_id: board_id.into()
        }
    );
    let feed = state.service.feed(board_id, 1).await.unwrap();
    assert_eq!(
        recv_event(ws).await,
        BoardEvent::ActionLogged {
            board_id: board_id.into(),
            action_id: feed[0].action.id.clone(),
        }
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn board_members_receive_change_events() {
    let (addr, state) = start().await;
    let mut alice = join(addr, "b1").await;
    let mut bob = join(addr, "b1").await;

    let task = state
        .service
        .create("u1", "b1", "Write spec", None, Priority::Medium)
        .await
        .unwrap();

    for ws in [&mut alice, &mut bob] {
        assert_eq!(
            recv_event(ws).await,
            BoardEvent::TaskUpdated {
                board_id: "b1".into(),
                task_id: task.id.clone(),
            }
        );
        assert_eq!(
            recv_event(ws).await,
            BoardEvent::TasksChanged {
                board_id: "b1".into()
            }
        );
        assert!(matches!(
            recv_event(ws).await,
            BoardEvent::ActionLogged { .. }
        ));
    }
}

#[tokio::test]
async fn other_boards_are_not_notified() {
    let (addr, state) = start().await;
    let mut watcher = join(addr, "b1").await;
    let mut outsider = join(addr, "b2").await;

    state
        .service
        .create("u1", "b1", "Write spec", None, Priority::Medium)
        .await
        .unwrap();

    assert!(matches!(
        recv_event(&mut watcher).await,
        BoardEvent::TaskUpdated { .. }
    ));
    assert_silent(&mut outsider).await;
}

#[tokio::test]
async fn leaving_stops_events() {
    let (addr, state) = start().await;
    let mut ws = join(addr, "b1").await;

    ws_send(
        &mut ws,
        &ClientMessage::LeaveBoard {
            board_id: "b1".into(),
        },
    )
    .await;
    assert_eq!(
        ws_recv(&mut ws).await,
        ServerMessage::Left {
            board_id: "b1".into()
        }
    );

    state
        .service
        .create("u1", "b1", "Write spec", None, Priority::Medium)
        .await
        .unwrap();
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn move_and_delete_are_broadcast() {
    let (addr, state) = start().await;
    let task = state
        .service
        .create("u1", "b1", "Write spec", None, Priority::Medium)
        .await
        .unwrap();
    let mut ws = join(addr, "b1").await;

    let patch = TaskPatch {
        status: Some(TaskStatus::Done),
        ..TaskPatch::default()
    };
    state
        .service
        .update("u1", &task.id, patch, Some(task.last_edited))
        .await
        .unwrap();
    assert!(matches!(
        recv_event(&mut ws).await,
        BoardEvent::TaskUpdated { .. }
    ));
    assert!(matches!(
        recv_event(&mut ws).await,
        BoardEvent::TasksChanged { .. }
    ));
    assert!(matches!(
        recv_event(&mut ws).await,
        BoardEvent::ActionLogged { .. }
    ));

    state.service.delete("u1", &task.id).await.unwrap();
    expect_change(&mut ws, &state, "b1", &task.id).await;
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn smart_assign_is_broadcast() {
    let (addr, state) = start().await;
    let task = state
        .service
        .create("u1", "b1", "Write spec", None, Priority::Medium)
        .await
        .unwrap();
    let mut ws = join(addr, "b1").await;

    let assigned = state.service.smart_assign("u1", &task.id).await.unwrap();
    assert_eq!(assigned.assigned_user.as_deref(), Some("u1"));
    expect_change(&mut ws, &state, "b1", &task.id).await;
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn conflicting_edit_is_not_broadcast() {
    let (addr, state) = start().await;
    let task = state
        .service
        .create("u1", "b1", "Write spec", None, Priority::Medium)
        .await
        .unwrap();
    state
        .service
        .update("u1", &task.id, TaskPatch::default(), Some(task.last_edited))
        .await
        .unwrap();
    let feed_before = state.service.feed("b1", 100).await.unwrap();
    let mut ws = join(addr, "b1").await;

    let patch = TaskPatch {
        priority: Some(Priority::High),
        ..TaskPatch::default()
    };
    let result = state
        .service
        .update("u2", &task.id, patch, Some(task.last_edited))
        .await;
    assert!(matches!(result, Err(MutationError::Conflict { .. })));
    assert_silent(&mut ws).await;
    assert_eq!(state.service.feed("b1", 100).await.unwrap(), feed_before);
}

#[tokio::test]
async fn rejected_mutation_is_not_broadcast() {
    let (addr, state) = start().await;
    let mut ws = join(addr, "b1").await;

    let result = state
        .service
        .create("u1", "b1", "Todo", None, Priority::Medium)
        .await;
    assert!(result.is_err());
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn malformed_frame_gets_error_reply() {
    let (addr, _state) = start().await;
    let mut ws = connect(addr).await;
    ws.send(tungstenite::Message::Binary(vec![0xFF, 0xFF, 0xFF].into()))
        .await
        .unwrap();
    assert!(matches!(
        ws_recv(&mut ws).await,
        ServerMessage::Error { .. }
    ));
}

#[tokio::test]
async fn disconnect_drops_session() {
    let (addr, state) = start().await;
    let ws = join(addr, "b1").await;
    assert_eq!(state.service.notifier().subscriber_count("b1"), 1);

    drop(ws);

    let notifier = Arc::clone(state.service.notifier());
    tokio::time::timeout(Duration::from_secs(5), async move {
        while notifier.session_count() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("session was not cleaned up");
    assert_eq!(state.service.notifier().subscriber_count("b1"), 0);
}
