//! Blocking token bucket with a background refill thread.
//!
//! All bucket state lives behind one `parking_lot::Mutex`. Two condition
//! variables are bound to that mutex: `available` carries token broadcasts to
//! blocked acquirers, `stop` lets `shutdown` interrupt the refill thread's
//! timed wait.
//!
//! # Refill model
//!
//! Ticks are fixed-cadence: tick `n` fires at `start + n * refill_interval` on
//! the refill thread's own clock, whatever acquirers did in between. Each tick
//! adds `refill_count` tokens clamped to `capacity`. Partial intervals are
//! never amortised.
//!
//! # Fairness
//!
//! A tick wakes every blocked acquirer (`notify_all`). Woken threads race for
//! the mutex and each rechecks `tokens > 0` before taking one, so exactly as
//! many proceed as there are tokens. Which ones win is unspecified: there is
//! no FIFO ordering among waiters.
//!
//! # Example
//!
//! ```
//! use prometheus_token_gate::config::BucketConfig;
//! use prometheus_token_gate::core::{TaskId, TokenBucket};
//! use std::time::Duration;
//!
//! let bucket = TokenBucket::new(BucketConfig::new(2, Duration::from_millis(10), 1, 2)).unwrap();
//! bucket.acquire(TaskId(1)).unwrap();
//! bucket.acquire(TaskId(2)).unwrap();
//! // Empty now; the third caller waits for a refill tick.
//! bucket.acquire(TaskId(3)).unwrap();
//! bucket.shutdown();
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace};

use crate::config::BucketConfig;
use crate::core::{BucketError, TaskId};

/// Snapshot of bucket state and lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketStats {
    /// Tokens currently available.
    pub tokens: u32,
    /// Maximum tokens.
    pub capacity: u32,
    /// Refill ticks fired so far.
    pub refill_ticks: u64,
    /// Tokens actually added by refills (after clamping).
    pub tokens_refilled: u64,
    /// Successful acquisitions.
    pub tokens_granted: u64,
    /// Callers currently blocked in `acquire`.
    pub waiting: usize,
    /// Whether `shutdown` has run.
    pub shut_down: bool,
}

/// Mutable state, only touched under `Shared::state`.
#[derive(Debug)]
struct BucketState {
    tokens: u32,
    shutdown: bool,
    waiting: usize,
    refill_ticks: u64,
    tokens_refilled: u64,
    tokens_granted: u64,
}

struct Shared {
    state: Mutex<BucketState>,
    /// Broadcast on refill and on shutdown.
    available: Condvar,
    /// Wakes the refill thread early on shutdown.
    stop: Condvar,
    capacity: u32,
    refill_interval: Duration,
    refill_count: u32,
}

impl Shared {
    /// Take one token if there is one. Caller holds the lock.
    fn take(&self, state: &mut BucketState, requester: TaskId) -> bool {
        if state.tokens == 0 {
            return false;
        }
        state.tokens -= 1;
        state.tokens_granted += 1;
        debug!(
            task_id = %requester,
            remaining = state.tokens,
            capacity = self.capacity,
            "Token acquired"
        );
        true
    }

    /// Add one tick's worth of tokens, clamped. Returns tokens added.
    fn refill(&self, state: &mut BucketState) -> u32 {
        let before = state.tokens;
        state.tokens = before.saturating_add(self.refill_count).min(self.capacity);
        let added = state.tokens - before;
        state.refill_ticks += 1;
        state.tokens_refilled += u64::from(added);
        added
    }
}

/// A thread-safe token bucket.
///
/// Construction validates the configuration and starts the refill thread.
/// The thread stops on [`shutdown`](Self::shutdown), which also runs on drop,
/// so a bucket that goes out of scope on any path (return, `?`, panic) never
/// leaks its refill thread.
pub struct TokenBucket {
    shared: Arc<Shared>,
    refill_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TokenBucket {
    /// Create a bucket and start refilling.
    ///
    /// # Errors
    ///
    /// - `BucketError::InvalidConfiguration` for zero capacity, interval or
    ///   refill count, or `initial_tokens > capacity`
    /// - `BucketError::Spawn` if the refill thread cannot be started
    pub fn new(config: BucketConfig) -> Result<Self, BucketError> {
        config
            .validate()
            .map_err(BucketError::InvalidConfiguration)?;

        let shared = Arc::new(Shared {
            state: Mutex::new(BucketState {
                tokens: config.initial_tokens,
                shutdown: false,
                waiting: 0,
                refill_ticks: 0,
                tokens_refilled: 0,
                tokens_granted: 0,
            }),
            available: Condvar::new(),
            stop: Condvar::new(),
            capacity: config.capacity,
            refill_interval: config.refill_interval(),
            refill_count: config.refill_count,
        });

        let refill_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("tg-refill".into())
            .spawn(move || refill_loop(&refill_shared))
            .map_err(|e| BucketError::Spawn(e.to_string()))?;

        info!(
            capacity = config.capacity,
            refill_interval = ?config.refill_interval,
            refill_count = config.refill_count,
            initial_tokens = config.initial_tokens,
            "TokenBucket created"
        );

        Ok(Self {
            shared,
            refill_handle: Mutex::new(Some(handle)),
        })
    }

    /// Bucket refilled with `rate` tokens once per second.
    ///
    /// # Errors
    ///
    /// Same as [`TokenBucket::new`].
    pub fn per_second(capacity: u32, rate: u32, initial_tokens: u32) -> Result<Self, BucketError> {
        Self::new(BucketConfig::per_second(capacity, rate, initial_tokens))
    }

    /// Block until a token is available, then take it.
    ///
    /// # Errors
    ///
    /// - `BucketError::Shutdown` if the bucket was already shut down
    /// - `BucketError::AcquisitionInterrupted` if it shut down while waiting
    pub fn acquire(&self, requester: TaskId) -> Result<(), BucketError> {
        self.acquire_inner(requester, None)
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`. A
    /// timeout too large to express as an `Instant` waits without limit.
    ///
    /// # Errors
    ///
    /// As `acquire`, plus `BucketError::Timeout` on expiry.
    pub fn acquire_timeout(&self, requester: TaskId, timeout: Duration) -> Result<(), BucketError> {
        self.acquire_inner(requester, Instant::now().checked_add(timeout))
    }

    /// Take a token only if one is available right now.
    ///
    /// # Errors
    ///
    /// `BucketError::Shutdown` if the bucket was shut down.
    pub fn try_acquire(&self, requester: TaskId) -> Result<bool, BucketError> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(BucketError::Shutdown);
        }
        Ok(self.shared.take(&mut state, requester))
    }

    fn acquire_inner(&self, requester: TaskId, deadline: Option<Instant>) -> Result<(), BucketError> {
        trace!(task_id = %requester, "Requesting token");
        let shared = &*self.shared;
        let mut state = shared.state.lock();

        if state.shutdown {
            return Err(BucketError::Shutdown);
        }
        if shared.take(&mut state, requester) {
            return Ok(());
        }

        state.waiting += 1;
        debug!(task_id = %requester, waiting = state.waiting, "No tokens, waiting for refill");

        let outcome = loop {
            match deadline {
                Some(deadline) => {
                    if shared.available.wait_until(&mut state, deadline).timed_out() {
                        // A refill may have landed right at the deadline.
                        if !state.shutdown && shared.take(&mut state, requester) {
                            break Ok(());
                        }
                        break Err(if state.shutdown {
                            BucketError::AcquisitionInterrupted
                        } else {
                            BucketError::Timeout
                        });
                    }
                }
                None => shared.available.wait(&mut state),
            }

            if state.shutdown {
                break Err(BucketError::AcquisitionInterrupted);
            }
            if shared.take(&mut state, requester) {
                break Ok(());
            }
        };

        state.waiting -= 1;
        if let Err(e) = &outcome {
            debug!(task_id = %requester, error = %e, "Token not granted");
        }
        outcome
    }

    /// Tokens available right now.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.shared.state.lock().tokens
    }

    /// Maximum tokens.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.shared.capacity
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Consistent snapshot of state and counters.
    #[must_use]
    pub fn stats(&self) -> BucketStats {
        let state = self.shared.state.lock();
        BucketStats {
            tokens: state.tokens,
            capacity: self.shared.capacity,
            refill_ticks: state.refill_ticks,
            tokens_refilled: state.tokens_refilled,
            tokens_granted: state.tokens_granted,
            waiting: state.waiting,
            shut_down: state.shutdown,
        }
    }

    /// Stop refilling and release every blocked acquirer with
    /// `BucketError::AcquisitionInterrupted`. Later calls to `acquire` fail
    /// with `BucketError::Shutdown`. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            info!(
                waiting = state.waiting,
                tokens = state.tokens,
                "Shutting down token bucket"
            );
            self.shared.available.notify_all();
            self.shared.stop.notify_all();
        }

        let handle = self.refill_handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                debug!("Refill thread panicked");
            }
        }
    }
}

impl Drop for TokenBucket {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Run `f` with a fresh bucket, shutting it down on every exit path.
///
/// # Errors
///
/// Fails only if the bucket cannot be constructed.
pub fn with_bucket<T, F>(config: BucketConfig, f: F) -> Result<T, BucketError>
where
    F: FnOnce(&TokenBucket) -> T,
{
    let bucket = TokenBucket::new(config)?;
    let out = f(&bucket);
    bucket.shutdown();
    Ok(out)
}

fn refill_loop(shared: &Shared) {
    // `None` once the schedule runs past what `Instant` can represent: no
    // further ticks, only shutdown.
    let mut next_tick = Instant::now().checked_add(shared.refill_interval);
    let mut state = shared.state.lock();

    loop {
        match next_tick {
            Some(tick) => {
                while !state.shutdown && Instant::now() < tick {
                    let _ = shared.stop.wait_until(&mut state, tick);
                }
            }
            None => {
                while !state.shutdown {
                    shared.stop.wait(&mut state);
                }
            }
        }
        if state.shutdown {
            break;
        }

        let added = shared.refill(&mut state);
        if added > 0 {
            trace!(
                added,
                tokens = state.tokens,
                capacity = shared.capacity,
                "Refilled tokens"
            );
            shared.available.notify_all();
        }
        next_tick = next_tick.and_then(|tick| tick.checked_add(shared.refill_interval));
    }

    debug!(ticks = state.refill_ticks, "Refill thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slow_bucket(capacity: u32, initial: u32) -> TokenBucket {
        // Long interval: no refill during the test.
        TokenBucket::new(BucketConfig::new(capacity, Duration::from_secs(3600), 1, initial)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = TokenBucket::new(BucketConfig::new(0, Duration::from_secs(1), 1, 0)).unwrap_err();
        assert!(matches!(err, BucketError::InvalidConfiguration(_)));

        let err = TokenBucket::new(BucketConfig::new(3, Duration::from_secs(1), 1, 4)).unwrap_err();
        assert!(matches!(err, BucketError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_try_acquire_drains_to_zero() {
        let bucket = slow_bucket(3, 2);
        assert!(bucket.try_acquire(TaskId(1)).unwrap());
        assert!(bucket.try_acquire(TaskId(2)).unwrap());
        assert!(!bucket.try_acquire(TaskId(3)).unwrap());
        assert_eq!(bucket.available(), 0);
        assert_eq!(bucket.stats().tokens_granted, 2);
    }

    #[test]
    fn test_refill_clamps_to_capacity() {
        let shared = Shared {
            state: Mutex::new(BucketState {
                tokens: 4,
                shutdown: false,
                waiting: 0,
                refill_ticks: 0,
                tokens_refilled: 0,
                tokens_granted: 0,
            }),
            available: Condvar::new(),
            stop: Condvar::new(),
            capacity: 5,
            refill_interval: Duration::from_secs(1),
            refill_count: 3,
        };
        let mut state = shared.state.lock();
        assert_eq!(shared.refill(&mut state), 1);
        assert_eq!(state.tokens, 5);
        assert_eq!(shared.refill(&mut state), 0);
        assert_eq!(state.tokens, 5);
        assert_eq!(state.refill_ticks, 2);
        assert_eq!(state.tokens_refilled, 1);
    }

    #[test]
    fn test_acquire_timeout_expires() {
        let bucket = slow_bucket(1, 0);
        let start = Instant::now();
        let err = bucket
            .acquire_timeout(TaskId(1), Duration::from_millis(30))
            .unwrap_err();
        assert_eq!(err, BucketError::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(bucket.stats().waiting, 0);
    }

    #[test]
    fn test_acquire_after_shutdown_fails() {
        let bucket = slow_bucket(1, 1);
        bucket.shutdown();
        assert_eq!(bucket.acquire(TaskId(1)), Err(BucketError::Shutdown));
        assert_eq!(bucket.try_acquire(TaskId(1)), Err(BucketError::Shutdown));
        // Tokens are left untouched.
        assert_eq!(bucket.available(), 1);
    }

    #[test]
    fn test_with_bucket_shuts_down() {
        let cfg = BucketConfig::new(2, Duration::from_millis(10), 1, 2);
        let granted = with_bucket(cfg, |bucket| {
            bucket.acquire(TaskId(1)).unwrap();
            bucket.stats().tokens_granted
        })
        .unwrap();
        assert_eq!(granted, 1);
    }

    #[test]
    fn test_acquire_timeout_unrepresentable_deadline_waits_untimed() {
        let bucket = TokenBucket::new(BucketConfig::new(1, Duration::from_millis(10), 1, 0)).unwrap();
        assert_eq!(bucket.acquire_timeout(TaskId(1), Duration::MAX), Ok(()));

        let bucket = Arc::new(slow_bucket(1, 0));
        let waiter = {
            let bucket = Arc::clone(&bucket);
            thread::spawn(move || bucket.acquire_timeout(TaskId(2), Duration::MAX))
        };
        while bucket.stats().waiting == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        bucket.shutdown();
        assert_eq!(waiter.join().unwrap(), Err(BucketError::AcquisitionInterrupted));
    }

    #[test]
    fn test_unrepresentable_refill_schedule_only_stops() {
        let bucket = TokenBucket::new(BucketConfig::new(2, Duration::MAX, 1, 1)).unwrap();
        assert!(bucket.try_acquire(TaskId(1)).unwrap());
        assert!(!bucket.try_acquire(TaskId(2)).unwrap());

        let start = Instant::now();
        bucket.shutdown();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(bucket.stats().refill_ticks, 0);
    }

    #[test]
    fn test_sub_millisecond_refill() {
        let bucket = TokenBucket::new(BucketConfig::new(1, Duration::from_micros(500), 1, 0)).unwrap();
        for id in 0..5 {
            bucket.acquire(TaskId(id)).unwrap();
        }
        assert!(bucket.stats().refill_ticks >= 5);
    }

    #[test]
    fn test_with_bucket_shuts_down_when_closure_panics() {
        let cfg = BucketConfig::new(2, Duration::from_millis(5), 1, 0);
        let mut shared = None;

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            with_bucket(cfg, |bucket| {
                shared = Some(Arc::clone(&bucket.shared));
                panic!("closure failed");
            })
        }));
        assert!(outcome.is_err());

        let shared = shared.unwrap();
        assert!(shared.state.lock().shutdown);
        // The refill thread held the only other reference and has been joined.
        assert_eq!(Arc::strong_count(&shared), 1);
    }
}
