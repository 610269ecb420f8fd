//! Configuration models for the bucket, the worker pool and the dispatcher.

pub mod bucket;
pub mod dispatcher;
pub mod pool;

pub use bucket::BucketConfig;
pub use dispatcher::{AdmissionGate, DispatcherConfig, ENV_PREFIX};
pub use pool::WorkerPoolConfig;
