//! Tests for the task model

use prometheus_token_gate::core::{admission_order, Completion, Task, TaskError, TaskId, TaskState};
use std::time::Duration;

#[test]
fn test_task_from_millis() {
    let task = Task::from_millis(3, 1_500, 250);
    assert_eq!(task.id, TaskId(3));
    assert_eq!(task.arrival_offset, Duration::from_millis(1_500));
    assert_eq!(task.duration, Duration::from_millis(250));
}

#[test]
fn test_task_id_display() {
    assert_eq!(TaskId(42).to_string(), "42");
}

#[test]
fn test_completion_state() {
    let ok: Completion<u8> = Completion { id: TaskId(1), outcome: Ok(1) };
    let failed: Completion<u8> = Completion {
        id: TaskId(2),
        outcome: Err(TaskError::Failed("no".into())),
    };
    let rejected: Completion<u8> = Completion {
        id: TaskId(3),
        outcome: Err(TaskError::Rejected("no token".into())),
    };
    assert_eq!(ok.state(), TaskState::Completed);
    assert_eq!(failed.state(), TaskState::Failed);
    assert_eq!(rejected.state(), TaskState::Rejected);
    assert_eq!(ok.result(), Some(&1));
    assert_eq!(rejected.result(), None);
    assert!(TaskState::Rejected.is_terminal());
    assert!(!TaskState::WaitingForToken.is_terminal());
}

#[test]
fn test_admission_order_spec_arrivals() {
    let tasks: Vec<Task> = [0, 1, 1, 3, 4]
        .iter()
        .enumerate()
        .map(|(i, &arrival)| Task::from_millis(i as u64, arrival, 1))
        .collect();
    assert_eq!(admission_order(&tasks), vec![0, 1, 2, 3, 4]);
}
