//! Task model: identity, arrival timing, lifecycle and completion.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::TaskError;

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A unit of work released at `arrival_offset` after the dispatch epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Task identifier.
    pub id: TaskId,
    /// When the task becomes eligible, relative to the dispatch epoch.
    pub arrival_offset: Duration,
    /// Simulated work time once admitted.
    pub duration: Duration,
}

impl Task {
    /// Create a task.
    #[must_use]
    pub fn new(id: impl Into<TaskId>, arrival_offset: Duration, duration: Duration) -> Self {
        Self {
            id: id.into(),
            arrival_offset,
            duration,
        }
    }

    /// Create a task with millisecond offsets.
    #[must_use]
    pub fn from_millis(id: u64, arrival_ms: u64, duration_ms: u64) -> Self {
        Self::new(
            id,
            Duration::from_millis(arrival_ms),
            Duration::from_millis(duration_ms),
        )
    }
}

/// Lifecycle of a task inside a dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Known to the dispatcher, arrival not reached.
    Pending,
    /// Arrived, blocked on a token.
    WaitingForToken,
    /// Token granted and handed to a worker.
    Running,
    /// Executor returned a value.
    Completed,
    /// Executor returned an error or panicked.
    Failed,
    /// Never admitted.
    Rejected,
}

impl TaskState {
    /// Whether the task has left the dispatcher for good.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }
}

/// Completion signal for one task: its id and either a result or the reason
/// it produced none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<R> {
    /// Task identifier.
    pub id: TaskId,
    /// Executor result or per-task failure.
    pub outcome: Result<R, TaskError>,
}

impl<R> Completion<R> {
    /// Final lifecycle state implied by the outcome.
    #[must_use]
    pub fn state(&self) -> TaskState {
        match &self.outcome {
            Ok(_) => TaskState::Completed,
            Err(TaskError::Rejected(_)) => TaskState::Rejected,
            Err(_) => TaskState::Failed,
        }
    }

    /// The result, if the task produced one.
    #[must_use]
    pub fn result(&self) -> Option<&R> {
        self.outcome.as_ref().ok()
    }
}
