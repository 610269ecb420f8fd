//! Token bucket configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Refill policy and sizing for a [`TokenBucket`](crate::core::TokenBucket).
///
/// The canonical form is `capacity, refill_interval, refill_count,
/// initial_tokens`. [`BucketConfig::per_second`] derives it from a
/// tokens-per-second rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Maximum tokens the bucket can hold.
    pub capacity: u32,
    /// Time between refill ticks. Serialized as `{ "secs", "nanos" }`.
    pub refill_interval: Duration,
    /// Tokens added on every tick, clamped to `capacity`.
    pub refill_count: u32,
    /// Tokens available at construction.
    pub initial_tokens: u32,
}

impl BucketConfig {
    /// Create a configuration from the canonical parameters.
    #[must_use]
    pub const fn new(
        capacity: u32,
        refill_interval: Duration,
        refill_count: u32,
        initial_tokens: u32,
    ) -> Self {
        Self {
            capacity,
            refill_interval,
            refill_count,
            initial_tokens,
        }
    }

    /// `rate` tokens every second.
    #[must_use]
    pub const fn per_second(capacity: u32, rate: u32, initial_tokens: u32) -> Self {
        Self {
            capacity,
            refill_interval: Duration::from_secs(1),
            refill_count: rate,
            initial_tokens,
        }
    }

    /// Interval between refill ticks.
    #[must_use]
    pub const fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Validate bucket configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be greater than 0".into());
        }
        if self.refill_interval.is_zero() {
            return Err("refill_interval must be greater than 0".into());
        }
        if self.refill_count == 0 {
            return Err("refill_count must be greater than 0".into());
        }
        if self.initial_tokens > self.capacity {
            return Err(format!(
                "initial_tokens ({}) must not exceed capacity ({})",
                self.initial_tokens, self.capacity
            ));
        }
        Ok(())
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self::per_second(5, 1, 0)
    }
}
