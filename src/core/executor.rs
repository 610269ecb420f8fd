//! Task execution trait and the simulated-work executor.

use async_trait::async_trait;

use crate::core::{Task, TaskError};

/// Abstraction for running an admitted task and producing a result.
///
/// On native platforms `execute` is called from a dedicated worker thread
/// with its own single-threaded tokio runtime, so long-running work does not
/// block the caller's runtime. Returning `Err` (or panicking) fails only this
/// task; siblings keep running.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_token_gate::core::{Task, TaskError, TaskExecutor};
///
/// #[derive(Clone)]
/// struct Checksum;
///
/// #[async_trait]
/// impl TaskExecutor<u64> for Checksum {
///     async fn execute(&self, task: Task) -> Result<u64, TaskError> {
///         Ok(task.id.0.wrapping_mul(31))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor<R>: Send + Sync + Clone + 'static
where
    R: Send + 'static,
{
    /// Run `task` to completion.
    async fn execute(&self, task: Task) -> Result<R, TaskError>;
}

/// Executor that "works" by sleeping for the task's duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedExecutor;

#[async_trait]
impl TaskExecutor<String> for SimulatedExecutor {
    async fn execute(&self, task: Task) -> Result<String, TaskError> {
        tokio::time::sleep(task.duration).await;
        Ok(format!("[Task {}] result", task.id))
    }
}
