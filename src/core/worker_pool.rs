//! Bounded worker pool running admitted tasks on dedicated threads.
//!
//! The pool is the dispatcher's external collaborator: `worker_count` threads
//! bound concurrent execution, and tasks beyond that bound wait in the pool's
//! own FIFO queue. `submit` never blocks; it enqueues or refuses.
//!
//! Each finished task produces exactly one [`Completion`] on the pool's
//! completion channel, including tasks that were refused a token in the worker
//! or drained during shutdown.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_token_gate::config::WorkerPoolConfig;
//! use prometheus_token_gate::core::{SimulatedExecutor, Task, WorkerPool};
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new().with_worker_count(4), SimulatedExecutor)?;
//! pool.submit(Task::from_millis(1, 0, 50))?;
//! let done = pool.completions().recv()?;
//! ```

mod native;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::{Task, TaskId, TaskState, TokenBucket};

pub use native::WorkerPool;

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Currently executing tasks.
    pub active_tasks: u64,
    /// Tasks waiting in the pool queue.
    pub queued_tasks: u64,
    /// Tasks whose executor returned a value.
    pub completed_tasks: u64,
    /// Tasks whose executor returned an error or panicked.
    pub failed_tasks: u64,
    /// Tasks refused a token inside a worker, or drained at shutdown.
    pub rejected_tasks: u64,
    /// Tasks accepted by `submit`.
    pub submitted_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub rejected_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            rejected_tasks: self.rejected_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
        }
    }
}

/// Token requirement carried by a job: the worker acquires from `bucket`
/// before running the task.
#[derive(Debug, Clone)]
pub struct TokenGate {
    /// Bucket to acquire from.
    pub bucket: Arc<TokenBucket>,
    /// Bounded wait; `None` blocks until granted or the bucket shuts down.
    pub timeout: Option<Duration>,
}

/// A task queued inside the pool.
#[derive(Debug)]
pub(crate) struct PoolJob {
    pub task: Task,
    pub gate: Option<TokenGate>,
}

/// Last known lifecycle state of every task that passed through a pool.
#[derive(Debug, Clone, Default)]
pub struct StateBoard {
    inner: Arc<Mutex<HashMap<TaskId, TaskState>>>,
}

impl StateBoard {
    /// Record a transition.
    pub fn set(&self, id: TaskId, state: TaskState) {
        self.inner.lock().insert(id, state);
    }

    /// Current state of `id`.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<TaskState> {
        self.inner.lock().get(&id).copied()
    }

    /// Copy of every tracked state.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<TaskId, TaskState> {
        self.inner.lock().clone()
    }

    /// Forget all tasks.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
