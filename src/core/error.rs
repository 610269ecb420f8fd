//! Error types for bucket, pool and dispatch operations.

use thiserror::Error;

/// Errors produced by a [`TokenBucket`](crate::core::TokenBucket).
///
/// Blocking is not an error: in steady state `acquire` only ever waits. These
/// variants cover malformed configuration and waits that can no longer be
/// satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BucketError {
    /// Capacity, interval or refill count is zero, or the initial token count
    /// exceeds capacity.
    #[error("invalid bucket configuration: {0}")]
    InvalidConfiguration(String),
    /// The bucket was shut down while the caller was blocked in `acquire`.
    #[error("token acquisition interrupted by shutdown")]
    AcquisitionInterrupted,
    /// The bucket had already been shut down when `acquire` was called.
    #[error("token bucket is shut down")]
    Shutdown,
    /// A bounded acquisition gave up before a token became available.
    #[error("timed out waiting for a token")]
    Timeout,
    /// The refill thread could not be started.
    #[error("failed to start refill thread: {0}")]
    Spawn(String),
}

/// Errors that can occur when using a [`WorkerPool`](crate::core::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool's internal queue is full; the task was not accepted.
    #[error("task queue is full")]
    QueueFull,
    /// The pool has been shut down.
    #[error("pool has been shut down")]
    PoolShutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Internal error (worker spawn failure, channel closed, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Per-task failure delivered through the completion channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The executor returned an error for this task.
    #[error("task failed: {0}")]
    Failed(String),
    /// The executor panicked while running this task.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task was never admitted (no token granted, or the pool refused it).
    #[error("task rejected: {0}")]
    Rejected(String),
}

/// Errors that abort a whole dispatch run rather than a single task.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Bucket construction or a bucket-level failure.
    #[error(transparent)]
    Bucket(#[from] BucketError),
    /// Pool construction or the completion channel closed early.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Dispatcher configuration was rejected.
    #[error("config invalid: {0}")]
    Config(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
