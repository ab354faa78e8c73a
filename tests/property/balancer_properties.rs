//! Property-based tests for the conflict check and smart-assign balancer.
//!
//! Uses proptest to verify:
//! 1. The chosen assignee has the minimum active load among candidates.
//! 2. Ties resolve to the candidate seen first in the board listing.
//! 3. An empty candidate pool falls back to the requester.
//! 4. A staleness token conflicts exactly when it is older than the record.

use proptest::prelude::*;
use taskboard_proto::task::{Priority, Task, TaskStatus, Timestamp};
use taskboard_server::balancer::{active_load, choose_assignee};
use taskboard_server::conflict::{check_conflict, is_stale};

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Done),
    ]
}

fn arb_assignee() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop_oneof![
        Just("alice".to_string()),
        Just("bob".to_string()),
        Just("carol".to_string()),
        Just("dave".to_string()),
    ])
}

fn arb_board() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec((arb_status(), arb_assignee()), 0..24).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (status, assigned_user))| {
                let mut task = Task::new("b1", &format!("task {i}"), None, Priority::Medium);
                task.status = status;
                task.assigned_user = assigned_user;
                task
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn chosen_assignee_has_minimum_load(board in arb_board()) {
        let loads = active_load(&board);
        let chosen = choose_assignee(&board, "requester");

        if loads.is_empty() {
            prop_assert_eq!(chosen, "requester");
        } else {
            let min = loads.iter().map(|l| l.active_tasks).min().unwrap_or(0);
            let first_min = loads.iter().find(|l| l.active_tasks == min);
            prop_assert_eq!(Some(chosen.as_str()), first_min.map(|l| l.user_id.as_str()));
        }
    }

    #[test]
    fn loads_only_count_active_assigned_tasks(board in arb_board()) {
        let total: usize = active_load(&board).iter().map(|l| l.active_tasks).sum();
        let expected = board.iter().filter(|t| t.is_active_assignment()).count();
        prop_assert_eq!(total, expected);
    }

    #[test]
    fn choice_is_deterministic(board in arb_board()) {
        prop_assert_eq!(
            choose_assignee(&board, "requester"),
            choose_assignee(&board, "requester")
        );
    }

    #[test]
    fn conflict_iff_client_older(client in 0u64..1_000, server in 0u64..1_000) {
        let mut task = Task::new("b1", "t", None, Priority::Low);
        task.last_edited = Timestamp::from_millis(server);

        let token = Timestamp::from_millis(client);
        prop_assert_eq!(is_stale(Some(token), task.last_edited), client < server);
        prop_assert_eq!(check_conflict(Some(token), &task).is_ok(), client >= server);
        prop_assert!(check_conflict(None, &task).is_ok());
    }
}
