//! Dispatcher configuration and environment loading.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{BucketConfig, WorkerPoolConfig};
use crate::core::AppResult;

/// Prefix for environment variables read by [`DispatcherConfig::from_env`].
pub const ENV_PREFIX: &str = "TOKEN_GATE_";

/// Where token acquisition happens for an admitted task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionGate {
    /// The dispatcher acquires before submitting to the pool.
    #[default]
    Dispatcher,
    /// The worker acquires after dequeuing, before running the task.
    Worker,
}

impl FromStr for AdmissionGate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dispatcher" => Ok(Self::Dispatcher),
            "worker" => Ok(Self::Worker),
            other => Err(format!("unknown admission gate `{other}`")),
        }
    }
}

/// Root configuration for a bucket-gated dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Token bucket sizing and refill policy.
    pub bucket: BucketConfig,
    /// Worker pool sizing.
    #[serde(default)]
    pub pool: WorkerPoolConfig,
    /// Where tokens are acquired.
    #[serde(default)]
    pub admission: AdmissionGate,
    /// Give up on a token after this many milliseconds; `None` blocks forever.
    #[serde(default)]
    pub admission_timeout_ms: Option<u64>,
}

impl DispatcherConfig {
    /// Bounded acquisition timeout, if configured.
    #[must_use]
    pub fn admission_timeout(&self) -> Option<Duration> {
        self.admission_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the bucket, the pool and the admission timeout.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid section.
    pub fn validate(&self) -> Result<(), String> {
        self.bucket
            .validate()
            .map_err(|e| format!("bucket invalid: {e}"))?;
        self.pool
            .validate()
            .map_err(|e| format!("pool invalid: {e}"))?;
        if self.admission_timeout_ms == Some(0) {
            return Err("admission_timeout_ms must be greater than 0 when set".into());
        }
        Ok(())
    }

    /// Parse dispatcher configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment, reading a `.env` file
    /// first if one exists. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Fails if a variable is set but unparsable, or the result is invalid.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is normal.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup using the
    /// `TOKEN_GATE_*` variable names.
    ///
    /// # Errors
    ///
    /// Fails if a value is unparsable or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("CAPACITY") {
            cfg.bucket.capacity = parse_var("CAPACITY", &v)?;
        }
        if let Some(v) = get("REFILL_INTERVAL_MS") {
            cfg.bucket.refill_interval = Duration::from_millis(parse_var("REFILL_INTERVAL_MS", &v)?);
        }
        // Finer grained, wins over the millisecond form when both are set.
        if let Some(v) = get("REFILL_INTERVAL_US") {
            cfg.bucket.refill_interval = Duration::from_micros(parse_var("REFILL_INTERVAL_US", &v)?);
        }
        if let Some(v) = get("REFILL_COUNT") {
            cfg.bucket.refill_count = parse_var("REFILL_COUNT", &v)?;
        }
        if let Some(v) = get("INITIAL_TOKENS") {
            cfg.bucket.initial_tokens = parse_var("INITIAL_TOKENS", &v)?;
        }
        if let Some(v) = get("WORKERS") {
            cfg.pool.worker_count = parse_var("WORKERS", &v)?;
        }
        if let Some(v) = get("QUEUE_DEPTH") {
            cfg.pool.max_queue_depth = Some(parse_var("QUEUE_DEPTH", &v)?);
        }
        if let Some(v) = get("ADMISSION") {
            cfg.admission = v
                .parse()
                .map_err(anyhow::Error::msg)
                .context("TOKEN_GATE_ADMISSION")?;
        }
        if let Some(v) = get("ADMISSION_TIMEOUT_MS") {
            cfg.admission_timeout_ms = Some(parse_var("ADMISSION_TIMEOUT_MS", &v)?);
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn parse_var<T>(name: &str, value: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("{ENV_PREFIX}{name}={value} is not a valid value"))
}
