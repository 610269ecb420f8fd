//! Tests for configuration validation

use prometheus_token_gate::config::{AdmissionGate, BucketConfig, DispatcherConfig, WorkerPoolConfig};
use std::time::Duration;

#[test]
fn test_bucket_config_validation() {
    let valid = BucketConfig::new(5, Duration::from_secs(1), 1, 3);
    assert!(valid.validate().is_ok());
}

#[test]
fn test_bucket_config_invalid_capacity() {
    let invalid = BucketConfig::new(0, Duration::from_secs(1), 1, 0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_bucket_config_invalid_interval() {
    let invalid = BucketConfig::new(5, Duration::ZERO, 1, 0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_bucket_config_invalid_refill_count() {
    let invalid = BucketConfig::new(5, Duration::from_secs(1), 0, 0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_bucket_config_initial_equal_capacity_ok() {
    let cfg = BucketConfig::new(5, Duration::from_secs(1), 1, 5);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_worker_count() {
    let invalid = WorkerPoolConfig::new().with_worker_count(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_invalid_queue_depth() {
    let invalid = WorkerPoolConfig::new().with_max_queue_depth(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_bucket_config_sub_millisecond_interval() {
    let cfg = BucketConfig::new(1, Duration::from_micros(500), 1, 0);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.refill_interval(), Duration::from_micros(500));
}

#[test]
fn test_pool_config_default_has_workers() {
    let cfg = WorkerPoolConfig::default();
    assert!(cfg.worker_count >= 1);
    assert_eq!(cfg.max_queue_depth, None);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_dispatcher_config_from_json() {
    let json = r#"{
        "bucket": {
            "capacity": 5,
            "refill_interval": { "secs": 1, "nanos": 0 },
            "refill_count": 1,
            "initial_tokens": 0
        },
        "pool": {
            "worker_count": 5,
            "max_queue_depth": 50
        },
        "admission": "worker",
        "admission_timeout_ms": 2500
    }"#;

    let config = DispatcherConfig::from_json_str(json).expect("valid config");
    assert_eq!(config.pool.worker_count, 5);
    assert_eq!(config.pool.max_queue_depth, Some(50));
    assert_eq!(config.bucket.refill_interval(), Duration::from_secs(1));
    assert_eq!(config.admission, AdmissionGate::Worker);
    assert_eq!(config.admission_timeout(), Some(Duration::from_millis(2500)));
}

#[test]
fn test_dispatcher_config_rejects_bad_bucket() {
    let json = r#"{
        "bucket": {
            "capacity": 2,
            "refill_interval": { "secs": 1, "nanos": 0 },
            "refill_count": 1,
            "initial_tokens": 3
        }
    }"#;
    let err = DispatcherConfig::from_json_str(json).unwrap_err();
    assert!(err.starts_with("bucket invalid"), "{err}");
}

#[test]
fn test_dispatcher_config_rejects_zero_timeout() {
    let cfg = DispatcherConfig {
        admission_timeout_ms: Some(0),
        ..DispatcherConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_admission_gate_parse() {
    assert_eq!("Dispatcher".parse::<AdmissionGate>(), Ok(AdmissionGate::Dispatcher));
    assert_eq!(" worker ".parse::<AdmissionGate>(), Ok(AdmissionGate::Worker));
    assert!("elsewhere".parse::<AdmissionGate>().is_err());
}
