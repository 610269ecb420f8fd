//! Scheduling clock: arrival deadlines measured from a fixed epoch.

use std::time::{Duration, Instant};

/// The instant a dispatch run started. Arrival offsets are relative to it.
#[derive(Debug, Clone, Copy)]
pub struct Epoch {
    start: Instant,
}

impl Epoch {
    /// Fix the epoch at the current instant.
    #[must_use]
    pub fn now() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Time elapsed since the epoch.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Absolute instant for an offset from the epoch, or `None` if it lies
    /// beyond what `Instant` can represent.
    #[must_use]
    pub fn deadline(&self, offset: Duration) -> Option<Instant> {
        self.start.checked_add(offset)
    }

    /// Wait still required before `offset` has elapsed. Never negative: an
    /// offset already in the past yields zero.
    #[must_use]
    pub fn remaining(&self, offset: Duration) -> Duration {
        offset.saturating_sub(self.elapsed())
    }

    /// Block the calling thread until `offset` has elapsed since the epoch.
    pub fn sleep_until(&self, offset: Duration) {
        let wait = self.remaining(offset);
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}
