//! Token bucket, task model, worker pool and the dispatcher tying them together.

pub mod arrival_queue;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod task;
pub mod token_bucket;
pub mod worker_pool;

pub use arrival_queue::{admission_order, ArrivalQueue};
pub use dispatcher::{Admission, DispatchOptions, DispatchReport, Dispatcher};
pub use error::{AppResult, BucketError, DispatchError, PoolError, TaskError};
pub use executor::{SimulatedExecutor, TaskExecutor};
pub use task::{Completion, Task, TaskId, TaskState};
pub use token_bucket::{with_bucket, BucketStats, TokenBucket};
pub use worker_pool::{PoolStats, StateBoard, TokenGate, WorkerPool};
