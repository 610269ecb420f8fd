//! Arrival-timed, token-gated task dispatch.
//!
//! A single sequential admission loop walks the [`ArrivalQueue`]. For each
//! task it sleeps until the arrival deadline, acquires a token (or delegates
//! that to the worker, see [`AdmissionGate`]) and hands the task to the
//! [`WorkerPool`]. Submission never blocks: saturation is absorbed by the
//! pool's internal queue, so the loop only ever waits on time or tokens.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::AdmissionGate;
use crate::core::{
    ArrivalQueue, BucketError, Completion, DispatchError, PoolError, StateBoard, Task, TaskError,
    TaskExecutor, TaskId, TaskState, TokenBucket, TokenGate, WorkerPool,
};
use crate::util::Epoch;

/// Admission behaviour of a [`Dispatcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Where tokens are acquired.
    pub admission: AdmissionGate,
    /// Bounded token wait; `None` blocks until granted or shutdown.
    pub admission_timeout: Option<Duration>,
}

/// One admission decision, recorded in admission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Task identifier.
    pub id: TaskId,
    /// Position of the task in the submitted list.
    pub index: usize,
    /// Requested arrival offset.
    pub arrival_offset: Duration,
    /// Actual offset from the epoch at which the task was handed to the pool.
    pub admitted_at: Duration,
}

/// Outcome of one [`Dispatcher::run`].
#[derive(Debug)]
pub struct DispatchReport<R> {
    /// Identifier of this run, also recorded on the tracing span.
    pub run_id: Uuid,
    /// Tasks handed to the pool, in admission order.
    pub admissions: Vec<Admission>,
    /// One completion per submitted task, in collection order.
    pub completions: Vec<Completion<R>>,
}

impl<R> DispatchReport<R> {
    /// Admitted task ids in admission order.
    #[must_use]
    pub fn admission_ids(&self) -> Vec<TaskId> {
        self.admissions.iter().map(|a| a.id).collect()
    }

    /// Completion for `id`, if any.
    #[must_use]
    pub fn completion(&self, id: TaskId) -> Option<&Completion<R>> {
        self.completions.iter().find(|c| c.id == id)
    }

    /// Completions that carry a result.
    pub fn succeeded(&self) -> impl Iterator<Item = &Completion<R>> {
        self.completions.iter().filter(|c| c.outcome.is_ok())
    }

    /// Completions that carry a per-task failure.
    pub fn failed(&self) -> impl Iterator<Item = &Completion<R>> {
        self.completions.iter().filter(|c| c.outcome.is_err())
    }
}

/// Releases tasks at their arrival offsets into a worker pool, one token per
/// task.
///
/// The bucket is shared (`Arc`) and outlives every run; the pool belongs to
/// the dispatcher. [`shutdown`](Self::shutdown) stops both. Dropping the
/// dispatcher only stops the pool; the bucket stops when its last owner drops.
pub struct Dispatcher<R, E>
where
    R: Send + 'static,
    E: TaskExecutor<R>,
{
    bucket: Arc<TokenBucket>,
    pool: WorkerPool<R, E>,
    options: DispatchOptions,
}

impl<R, E> Dispatcher<R, E>
where
    R: Send + 'static,
    E: TaskExecutor<R>,
{
    /// Create a dispatcher over an existing bucket and pool.
    pub fn new(bucket: Arc<TokenBucket>, pool: WorkerPool<R, E>, options: DispatchOptions) -> Self {
        Self {
            bucket,
            pool,
            options,
        }
    }

    /// The shared bucket.
    #[must_use]
    pub const fn bucket(&self) -> &Arc<TokenBucket> {
        &self.bucket
    }

    /// The worker pool.
    #[must_use]
    pub const fn pool(&self) -> &WorkerPool<R, E> {
        &self.pool
    }

    /// Admission behaviour.
    #[must_use]
    pub const fn options(&self) -> DispatchOptions {
        self.options
    }

    /// Last known state of every task seen by this dispatcher.
    #[must_use]
    pub fn task_states(&self) -> HashMap<TaskId, TaskState> {
        self.pool.states().snapshot()
    }

    /// Dispatch `tasks` and wait for all of them to finish.
    ///
    /// Tasks are admitted in non-decreasing `arrival_offset`, ties broken by
    /// their position in `tasks`. A task that fails, panics or is refused a
    /// token shows up as an `Err` completion; it never stops its siblings.
    ///
    /// In dispatcher-gated mode a bounded pool queue is checked for room
    /// before the token is taken, so a task refused for lack of room never
    /// consumes one.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Config` if two tasks share an id
    /// - `DispatchError::Pool(PoolError::PoolShutdown)` if the pool stops
    ///   before every completion has been collected
    pub fn run(&mut self, tasks: Vec<Task>) -> Result<DispatchReport<R>, DispatchError> {
        let mut seen = HashSet::with_capacity(tasks.len());
        if let Some(dup) = tasks.iter().find(|t| !seen.insert(t.id)) {
            return Err(DispatchError::Config(format!("duplicate task id {}", dup.id)));
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("dispatch", %run_id);
        let _enter = span.enter();

        let total = tasks.len();
        let states = self.pool.states().clone();
        for task in &tasks {
            states.set(task.id, TaskState::Pending);
        }
        let mut queue: ArrivalQueue = tasks.into_iter().collect();

        info!(tasks = total, admission = ?self.options.admission, "Dispatch started");
        let epoch = Epoch::now();
        let mut admissions = Vec::with_capacity(total);
        let mut completions = Vec::with_capacity(total);
        let mut submitted = 0_usize;

        while let Some((index, task)) = queue.pop() {
            epoch.sleep_until(task.arrival_offset);
            let id = task.id;
            let arrival_offset = task.arrival_offset;
            debug!(task_id = %id, ?arrival_offset, elapsed = ?epoch.elapsed(), "Task arrived");

            let submitted_ok = match self.options.admission {
                AdmissionGate::Dispatcher => {
                    if !self.pool.has_room() {
                        warn!(task_id = %id, "Pool queue full, task not admitted");
                        reject(&states, &mut completions, id, PoolError::QueueFull.to_string());
                        continue;
                    }
                    states.set(id, TaskState::WaitingForToken);
                    if let Err(e) = self.acquire(id) {
                        warn!(task_id = %id, error = %e, "Task not admitted");
                        reject(&states, &mut completions, id, e.to_string());
                        continue;
                    }
                    self.pool.submit(task)
                }
                AdmissionGate::Worker => self.pool.submit_gated(
                    task,
                    TokenGate {
                        bucket: Arc::clone(&self.bucket),
                        timeout: self.options.admission_timeout,
                    },
                ),
            };

            match submitted_ok {
                Ok(()) => {
                    submitted += 1;
                    admissions.push(Admission {
                        id,
                        index,
                        arrival_offset,
                        admitted_at: epoch.elapsed(),
                    });
                }
                Err(e) => {
                    // Only reachable on shutdown or a submit from outside this
                    // loop; a token already taken is not returned.
                    warn!(task_id = %id, error = %e, "Pool refused task");
                    reject(&states, &mut completions, id, e.to_string());
                }
            }
        }

        debug!(submitted, rejected = completions.len(), "Admission finished, collecting");
        for _ in 0..submitted {
            let completion = self
                .pool
                .completions()
                .recv()
                .map_err(|_| DispatchError::Pool(PoolError::PoolShutdown))?;
            completions.push(completion);
        }

        info!(
            completed = completions.iter().filter(|c| c.outcome.is_ok()).count(),
            failed = completions.iter().filter(|c| c.outcome.is_err()).count(),
            elapsed = ?epoch.elapsed(),
            "Dispatch finished"
        );

        Ok(DispatchReport {
            run_id,
            admissions,
            completions,
        })
    }

    fn acquire(&self, id: TaskId) -> Result<(), BucketError> {
        match self.options.admission_timeout {
            Some(timeout) => self.bucket.acquire_timeout(id, timeout),
            None => self.bucket.acquire(id),
        }
    }

    /// Stop the bucket (failing any blocked acquirer) and the pool.
    /// Idempotent.
    pub fn shutdown(&self) {
        self.bucket.shutdown();
        self.pool.shutdown();
    }
}

impl<R, E> Drop for Dispatcher<R, E>
where
    R: Send + 'static,
    E: TaskExecutor<R>,
{
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}

fn reject<R>(states: &StateBoard, completions: &mut Vec<Completion<R>>, id: TaskId, reason: String) {
    states.set(id, TaskState::Rejected);
    completions.push(Completion {
        id,
        outcome: Err(TaskError::Rejected(reason)),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BucketConfig, WorkerPoolConfig};
    use crate::core::SimulatedExecutor;

    fn dispatcher(initial: u32, options: DispatchOptions) -> Dispatcher<String, SimulatedExecutor> {
        let bucket = Arc::new(
            TokenBucket::new(BucketConfig::new(10, Duration::from_millis(20), 1, initial)).unwrap(),
        );
        let pool = WorkerPool::new(WorkerPoolConfig::new().with_worker_count(3), SimulatedExecutor).unwrap();
        Dispatcher::new(bucket, pool, options)
    }

    #[test]
    fn test_empty_run() {
        let mut d = dispatcher(0, DispatchOptions::default());
        let report = d.run(Vec::new()).unwrap();
        assert!(report.admissions.is_empty());
        assert!(report.completions.is_empty());
    }

    #[test]
    fn test_all_tasks_complete_with_results() {
        let mut d = dispatcher(5, DispatchOptions::default());
        let tasks = vec![Task::from_millis(1, 0, 5), Task::from_millis(2, 0, 5)];
        let report = d.run(tasks).unwrap();
        assert_eq!(report.admission_ids(), vec![TaskId(1), TaskId(2)]);
        assert_eq!(
            report.completion(TaskId(2)).and_then(Completion::result),
            Some(&"[Task 2] result".to_string())
        );
        assert_eq!(d.task_states().get(&TaskId(1)), Some(&TaskState::Completed));
    }

    #[test]
    fn test_duplicate_ids_refused_before_admission() {
        let mut d = dispatcher(5, DispatchOptions::default());
        let err = d
            .run(vec![Task::from_millis(4, 0, 1), Task::from_millis(4, 10, 1)])
            .unwrap_err();
        assert!(matches!(err, DispatchError::Config(ref msg) if msg.contains("duplicate task id 4")));
        assert_eq!(d.bucket().stats().tokens_granted, 0);
        assert!(d.task_states().is_empty());
    }

    #[test]
    fn test_timeout_rejects_without_tokens() {
        let bucket = Arc::new(
            TokenBucket::new(BucketConfig::new(1, Duration::from_secs(3600), 1, 1)).unwrap(),
        );
        let pool = WorkerPool::new(WorkerPoolConfig::new().with_worker_count(1), SimulatedExecutor).unwrap();
        let mut d = Dispatcher::new(
            bucket,
            pool,
            DispatchOptions {
                admission: AdmissionGate::Dispatcher,
                admission_timeout: Some(Duration::from_millis(20)),
            },
        );

        let report = d.run(vec![Task::from_millis(1, 0, 1), Task::from_millis(2, 0, 1)]).unwrap();
        assert_eq!(report.admission_ids(), vec![TaskId(1)]);
        assert_eq!(
            report.completion(TaskId(2)).map(Completion::state),
            Some(TaskState::Rejected)
        );
        assert_eq!(d.task_states().get(&TaskId(2)), Some(&TaskState::Rejected));
    }
}
