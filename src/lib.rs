//! # Prometheus Token Gate
//!
//! A thread-safe token-bucket rate limiter and a dispatcher that releases
//! time-staggered work into a bounded worker pool, one token per task.
//!
//! ## Components
//!
//! - **`TokenBucket`**: a counter bounded by `capacity`, refilled by a
//!   background thread with `refill_count` tokens every `refill_interval`.
//!   `acquire` blocks while the bucket is empty; `shutdown` stops the refill
//!   thread and fails every blocked acquirer.
//! - **`Dispatcher`**: orders tasks by arrival offset (ties by input order),
//!   sleeps until each arrival, acquires a token and submits the task to the
//!   `WorkerPool`. Every task ends as exactly one `Completion`.
//! - **`WorkerPool`**: dedicated OS threads, each with a current-thread tokio
//!   runtime, fed from a bounded FIFO queue.
//!
//! ## Example
//!
//! ```rust,no_run
//! use prometheus_token_gate::builders::build_simulated_dispatcher;
//! use prometheus_token_gate::config::{BucketConfig, DispatcherConfig, WorkerPoolConfig};
//! use prometheus_token_gate::core::Task;
//!
//! let cfg = DispatcherConfig {
//!     bucket: BucketConfig::per_second(5, 1, 3),
//!     pool: WorkerPoolConfig::new().with_worker_count(5),
//!     ..DispatcherConfig::default()
//! };
//! let mut dispatcher = build_simulated_dispatcher(&cfg)?;
//!
//! let report = dispatcher.run(vec![
//!     Task::from_millis(1, 0, 3_000),
//!     Task::from_millis(2, 1_000, 2_000),
//!     Task::from_millis(3, 1_000, 1_000),
//! ])?;
//! for done in &report.completions {
//!     println!("{}: {:?}", done.id, done.outcome);
//! }
//! dispatcher.shutdown();
//! # Ok::<(), prometheus_token_gate::core::DispatchError>(())
//! ```
//!
//! Waiters are not served in FIFO order: a refill wakes every blocked
//! acquirer and they race for the new tokens.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Token bucket, task model, worker pool and dispatcher.
pub mod core;
/// Configuration models for the bucket, pool and dispatcher.
pub mod config;
/// Builders to construct dispatchers from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
