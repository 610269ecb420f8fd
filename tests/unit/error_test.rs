//! Tests for error types

use prometheus_token_gate::core::{BucketError, DispatchError, PoolError, TaskError};

#[test]
fn test_invalid_configuration_error() {
    let err = BucketError::InvalidConfiguration("capacity must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid bucket configuration: capacity must be greater than 0"
    );
}

#[test]
fn test_acquisition_interrupted_error() {
    let err = BucketError::AcquisitionInterrupted;
    assert_eq!(format!("{}", err), "token acquisition interrupted by shutdown");
}

#[test]
fn test_pool_errors() {
    assert_eq!(format!("{}", PoolError::QueueFull), "task queue is full");
    assert_eq!(format!("{}", PoolError::PoolShutdown), "pool has been shut down");
}

#[test]
fn test_task_error() {
    let err = TaskError::Rejected("timed out waiting for a token".to_string());
    assert_eq!(format!("{}", err), "task rejected: timed out waiting for a token");
}

#[test]
fn test_dispatch_error_is_transparent() {
    let err: DispatchError = BucketError::Shutdown.into();
    assert_eq!(format!("{}", err), "token bucket is shut down");

    let err: DispatchError = PoolError::QueueFull.into();
    assert_eq!(format!("{}", err), "task queue is full");
}
