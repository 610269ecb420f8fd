//! Native implementation of `WorkerPool` using OS threads.
//!
//! Each worker owns a single-threaded tokio runtime and blocks on the shared
//! job channel. Dropping the job sender is the shutdown signal: workers drain
//! what is left (reporting it as rejected) and exit.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::WorkerPoolConfig;
use crate::core::{Completion, PoolError, Task, TaskError, TaskExecutor, TaskState};

use super::{PoolCounters, PoolJob, PoolStats, StateBoard, TokenGate};

/// How long `shutdown` waits for each worker before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Worker pool with dedicated OS threads.
///
/// # Design
///
/// - **No polling**: workers block on channel recv
/// - **Non-blocking submit**: `try_send` into the job queue, unbounded unless
///   `max_queue_depth` is set
/// - **Clean shutdown**: dropping the sender unblocks all workers
pub struct WorkerPool<R, E>
where
    R: Send + 'static,
    E: TaskExecutor<R>,
{
    config: WorkerPoolConfig,
    /// Job sender. Option allows clean shutdown by dropping.
    job_tx: Mutex<Option<Sender<PoolJob>>>,
    /// Completions from workers. Only workers hold senders, so the channel
    /// disconnects once every worker has exited.
    completion_rx: Receiver<Completion<R>>,
    counters: Arc<PoolCounters>,
    states: StateBoard,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    _executor: std::marker::PhantomData<E>,
}

impl<R, E> WorkerPool<R, E>
where
    R: Send + 'static,
    E: TaskExecutor<R>,
{
    /// Create a pool and spawn `config.worker_count` worker threads.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::Internal` if a worker thread cannot be spawned
    pub fn new(config: WorkerPoolConfig, executor: E) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let (job_tx, job_rx) = match config.max_queue_depth {
            Some(depth) => bounded::<PoolJob>(depth),
            None => unbounded::<PoolJob>(),
        };
        let (completion_tx, completion_rx) = unbounded::<Completion<R>>();
        let counters = Arc::new(PoolCounters::default());
        let states = StateBoard::default();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let ctx = WorkerContext {
                worker_id,
                job_rx: job_rx.clone(),
                completion_tx: completion_tx.clone(),
                counters: Arc::clone(&counters),
                states: states.clone(),
                shutdown: Arc::clone(&shutdown),
                executor: executor.clone(),
            };
            match spawn_worker(ctx, config.thread_stack_size) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Unblock whatever did start before bailing out.
                    shutdown.store(true, Ordering::Release);
                    drop(job_tx);
                    return Err(e);
                }
            }
        }

        info!(
            worker_count = config.worker_count,
            max_queue_depth = ?config.max_queue_depth,
            "WorkerPool initialized"
        );

        Ok(Self {
            config,
            job_tx: Mutex::new(Some(job_tx)),
            completion_rx,
            counters,
            states,
            shutdown,
            workers: Mutex::new(workers),
            _executor: std::marker::PhantomData,
        })
    }

    /// Queue a task to run as soon as a worker is free.
    ///
    /// # Errors
    ///
    /// - `PoolError::QueueFull` if the task queue is full
    /// - `PoolError::PoolShutdown` if the pool has been shut down
    pub fn submit(&self, task: Task) -> Result<(), PoolError> {
        self.enqueue(PoolJob { task, gate: None })
    }

    /// Queue a task whose worker must acquire a token from `gate` first.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_gated(&self, task: Task, gate: TokenGate) -> Result<(), PoolError> {
        self.enqueue(PoolJob {
            task,
            gate: Some(gate),
        })
    }

    fn enqueue(&self, job: PoolJob) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }

        let job_tx_guard = self.job_tx.lock();
        let Some(job_tx) = job_tx_guard.as_ref() else {
            return Err(PoolError::PoolShutdown);
        };

        let task_id = job.task.id;
        // Counted before the send so a fast worker never decrements first.
        self.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
        match job_tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(task_id = %task_id, "Task submitted to worker pool");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                warn!(task_id = %task_id, "Worker pool queue is full");
                Err(PoolError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                Err(PoolError::PoolShutdown)
            }
        }
    }

    /// Whether a `submit` right now would find room in the job queue.
    ///
    /// Always true for an unbounded queue until shutdown. With a single
    /// submitter, a `true` answer stays true until that submitter enqueues.
    #[must_use]
    pub fn has_room(&self) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }
        self.job_tx
            .lock()
            .as_ref()
            .is_some_and(|job_tx| !job_tx.is_full())
    }

    /// Receiver of task completions, in completion order.
    #[must_use]
    pub fn completions(&self) -> &Receiver<Completion<R>> {
        &self.completion_rx
    }

    /// Lifecycle states recorded by this pool's workers.
    #[must_use]
    pub fn states(&self) -> &StateBoard {
        &self.states
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.worker_count)
    }

    /// Pool configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Shut down the pool.
    ///
    /// Drops the job sender to unblock idle workers; queued jobs are reported
    /// as rejected. Each worker gets a bounded join; workers still running a
    /// task after that are detached. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Shutting down worker pool");
        self.job_tx.lock().take();

        let mut workers = self.workers.lock();
        let worker_count = workers.len();

        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = bounded(1);
            let join_thread = thread::spawn(move || {
                let joined = worker.join().is_ok();
                let _ = tx.send(joined);
            });

            match rx.recv_timeout(JOIN_TIMEOUT) {
                Ok(true) => debug!(worker_id = idx, "Worker joined successfully"),
                Ok(false) => warn!(worker_id = idx, "Worker panicked"),
                Err(_) => {
                    warn!(worker_id = idx, "Worker did not exit within timeout - detaching");
                    continue;
                }
            }
            let _ = join_thread.join();
        }

        info!(worker_count, "Worker pool shut down complete");
    }
}

impl<R, E> Drop for WorkerPool<R, E>
where
    R: Send + 'static,
    E: TaskExecutor<R>,
{
    fn drop(&mut self) {
        // Signal only; joining here could hang on a long-running task.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.job_tx.lock().take();
            debug!("WorkerPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

struct WorkerContext<R, E> {
    worker_id: usize,
    job_rx: Receiver<PoolJob>,
    completion_tx: Sender<Completion<R>>,
    counters: Arc<PoolCounters>,
    states: StateBoard,
    shutdown: Arc<AtomicBool>,
    executor: E,
}

impl<R, E> WorkerContext<R, E>
where
    R: Send + 'static,
    E: TaskExecutor<R>,
{
    fn finish(&self, completion: Completion<R>) {
        let state = completion.state();
        self.states.set(completion.id, state);
        let counter = match state {
            TaskState::Completed => &self.counters.completed_tasks,
            TaskState::Rejected => &self.counters.rejected_tasks,
            _ => &self.counters.failed_tasks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        // Nobody listening only happens once the pool itself is gone.
        let _ = self.completion_tx.send(completion);
    }

    fn run(self, rt: &tokio::runtime::Runtime) {
        let worker_id = self.worker_id;

        // Returns Err once the sender is dropped and the queue is empty.
        while let Ok(job) = self.job_rx.recv() {
            self.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
            let PoolJob { task, gate } = job;
            let task_id = task.id;

            if self.shutdown.load(Ordering::Acquire) {
                debug!(worker_id, task_id = %task_id, "Draining task after shutdown");
                self.finish(Completion {
                    id: task_id,
                    outcome: Err(TaskError::Rejected("pool shut down".into())),
                });
                continue;
            }

            if let Some(gate) = gate {
                self.states.set(task_id, TaskState::WaitingForToken);
                let granted = match gate.timeout {
                    Some(timeout) => gate.bucket.acquire_timeout(task_id, timeout),
                    None => gate.bucket.acquire(task_id),
                };
                if let Err(e) = granted {
                    warn!(worker_id, task_id = %task_id, error = %e, "Worker could not get a token");
                    self.finish(Completion {
                        id: task_id,
                        outcome: Err(TaskError::Rejected(e.to_string())),
                    });
                    continue;
                }
            }

            self.states.set(task_id, TaskState::Running);
            self.counters.active_tasks.fetch_add(1, Ordering::Relaxed);
            debug!(worker_id, task_id = %task_id, "Worker executing task");

            let executor = &self.executor;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| rt.block_on(executor.execute(task))))
                .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))));

            self.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
            match &outcome {
                Ok(_) => debug!(worker_id, task_id = %task_id, "Worker completed task"),
                Err(e) => warn!(worker_id, task_id = %task_id, error = %e, "Task failed"),
            }
            self.finish(Completion {
                id: task_id,
                outcome,
            });
        }

        debug!(worker_id, "Worker channel closed, exiting");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

fn spawn_worker<R, E>(ctx: WorkerContext<R, E>, stack_size: usize) -> Result<JoinHandle<()>, PoolError>
where
    R: Send + 'static,
    E: TaskExecutor<R>,
{
    let worker_id = ctx.worker_id;
    thread::Builder::new()
        .name(format!("tg-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "Worker thread started");

            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(worker_id, error = %e, "Failed to create worker runtime");
                    return;
                }
            };

            ctx.run(&rt);
        })
        .map_err(|e| PoolError::Internal(format!("failed to spawn worker {worker_id}: {e}")))
}
