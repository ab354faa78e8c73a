//! Property-based tests for the session wire format and task patches.
//!
//! Uses proptest to verify:
//! 1. Any board event survives a postcard round-trip inside a `ServerMessage`.
//! 2. Random bytes never cause a panic in the decoders.
//! 3. Applying a patch leaves absent fields untouched and clears explicit nulls.

use proptest::prelude::*;
use taskboard_proto::action::ActionId;
use taskboard_proto::session::{self, BoardEvent, ClientMessage, ServerMessage};
use taskboard_proto::task::{Priority, Task, TaskId, TaskPatch, TaskStatus};
use uuid::Uuid;

fn arb_task_id() -> impl Strategy<Value = TaskId> {
    any::<u128>().prop_map(|n| TaskId::from_uuid(Uuid::from_u128(n)))
}

fn arb_board_id() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,32}"
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Done),
    ]
}

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::Low), Just(Priority::Medium), Just(Priority::High)]
}

fn arb_event() -> impl Strategy<Value = BoardEvent> {
    prop_oneof![
        arb_board_id().prop_map(|board_id| BoardEvent::TasksChanged { board_id }),
        (arb_board_id(), arb_task_id())
            .prop_map(|(board_id, task_id)| BoardEvent::TaskUpdated { board_id, task_id }),
        arb_board_id().prop_map(|board_id| BoardEvent::ActionLogged {
            board_id,
            action_id: ActionId::new(),
        }),
    ]
}

fn arb_patch() -> impl Strategy<Value = TaskPatch> {
    (
        proptest::option::of("[a-z ]{1,20}"),
        proptest::option::of(proptest::option::of(".{0,40}")),
        proptest::option::of(arb_status()),
        proptest::option::of(arb_priority()),
        proptest::option::of(proptest::option::of("u[0-9]{1,3}")),
    )
        .prop_map(
            |(title, description, status, priority, assigned_user)| TaskPatch {
                title,
                description,
                status,
                priority,
                assigned_user,
            },
        )
}

proptest! {
    #[test]
    fn server_event_round_trip(event in arb_event()) {
        let msg = ServerMessage::Event(event);
        let bytes = session::encode_server(&msg).unwrap();
        let decoded = session::decode_server(&bytes).unwrap();
        prop_assert_eq!(msg, decoded);
    }

    #[test]
    fn client_join_round_trip(board_id in arb_board_id()) {
        let msg = ClientMessage::JoinBoard { board_id };
        let bytes = session::encode_client(&msg).unwrap();
        prop_assert_eq!(session::decode_client(&bytes).unwrap(), msg);
    }

    #[test]
    fn random_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = session::decode_client(&bytes);
        let _ = session::decode_server(&bytes);
    }

    #[test]
    fn patch_keeps_absent_fields(patch in arb_patch()) {
        let original = Task::new("board", "original title", Some("desc".into()), Priority::Low);
        let mut task = original.clone();
        patch.apply_to(&mut task);

        prop_assert_eq!(&task.id, &original.id);
        prop_assert_eq!(&task.board_id, &original.board_id);
        prop_assert_eq!(task.last_edited, original.last_edited);
        if patch.title.is_none() {
            prop_assert_eq!(&task.title, &original.title);
        }
        match &patch.description {
            None => prop_assert_eq!(&task.description, &original.description),
            Some(description) => prop_assert_eq!(&task.description, description),
        }
        if patch.status.is_none() {
            prop_assert_eq!(task.status, original.status);
        }
        if patch.priority.is_none() {
            prop_assert_eq!(task.priority, original.priority);
        }
        match &patch.assigned_user {
            None => prop_assert_eq!(&task.assigned_user, &original.assigned_user),
            Some(assignee) => prop_assert_eq!(&task.assigned_user, assignee),
        }
    }
}
