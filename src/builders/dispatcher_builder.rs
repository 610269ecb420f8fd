//! Build a ready-to-run dispatcher from `DispatcherConfig`.

use std::sync::Arc;

use crate::config::DispatcherConfig;
use crate::core::{
    DispatchError, DispatchOptions, Dispatcher, SimulatedExecutor, TaskExecutor, TokenBucket,
    WorkerPool,
};

/// Validate `cfg`, start the bucket and the pool, and wire them together.
///
/// # Errors
///
/// - `DispatchError::Config` if the configuration is invalid
/// - `DispatchError::Bucket` / `DispatchError::Pool` if either fails to start
pub fn build_dispatcher<R, E>(cfg: &DispatcherConfig, executor: E) -> Result<Dispatcher<R, E>, DispatchError>
where
    R: Send + 'static,
    E: TaskExecutor<R>,
{
    cfg.validate().map_err(DispatchError::Config)?;

    let bucket = Arc::new(TokenBucket::new(cfg.bucket.clone())?);
    let pool = WorkerPool::new(cfg.pool.clone(), executor)?;
    let options = DispatchOptions {
        admission: cfg.admission,
        admission_timeout: cfg.admission_timeout(),
    };

    Ok(Dispatcher::new(bucket, pool, options))
}

/// [`build_dispatcher`] with the sleep-for-duration executor.
///
/// # Errors
///
/// Same as [`build_dispatcher`].
pub fn build_simulated_dispatcher(
    cfg: &DispatcherConfig,
) -> Result<Dispatcher<String, SimulatedExecutor>, DispatchError> {
    build_dispatcher(cfg, SimulatedExecutor)
}
