//! Fixed-window rate limit records.

use std::time::{Duration, Instant};

use super::policy::Policy;

/// The limiter's verdict for one request.
///
/// Denial is a normal outcome, not an error. The serving layer is expected
/// to translate a denied decision into its own protocol response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is permitted
    pub allowed: bool,
    /// Requests left in the current window, zero when denied
    pub remaining: u32,
    /// Time until the window resets, zero when allowed
    pub retry_after: Duration,
}

/// Per-key request count for the current window.
///
/// The window is fixed, not sliding: once `window_start` is older than the
/// policy's window the count resets and a fresh window begins at the next
/// observed request. Bursts of up to twice the budget can therefore span a
/// window edge; in exchange no timestamp history is kept.
#[derive(Debug)]
pub struct RateLimitRecord {
    /// Requests observed in the current window
    count: u32,
    /// When the current window began; never moves backwards
    window_start: Instant,
}

impl RateLimitRecord {
    /// Create an empty record whose window begins at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Observe one request at `now` and decide whether it is within budget.
    ///
    /// An allowed request increments the count (resetting the window first
    /// if it has expired). A denied request leaves the record untouched, so
    /// over-limit callers cannot push their own reset further away.
    pub fn observe(&mut self, policy: &Policy, now: Instant) -> Decision {
        let elapsed = now.duration_since(self.window_start);

        if elapsed >= policy.window() {
            // Window expired: start a fresh one regardless of the old count.
            self.window_start = now;
            self.count = 1;
            return Decision {
                allowed: true,
                remaining: policy.max_requests() - 1,
                retry_after: Duration::ZERO,
            };
        }

        if self.count < policy.max_requests() {
            self.count += 1;
            return Decision {
                allowed: true,
                remaining: policy.max_requests() - self.count,
                retry_after: Duration::ZERO,
            };
        }

        Decision {
            allowed: false,
            remaining: 0,
            retry_after: policy.window() - elapsed,
        }
    }

    /// Requests observed in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Whether this record has been idle long enough to evict.
    ///
    /// A record is idle once its window start is older than `idle_multiple`
    /// windows, meaning the caller has not been seen for several full
    /// window lengths.
    pub fn is_idle(&self, window: Duration, idle_multiple: u32, now: Instant) -> bool {
        // A grace period too large to represent means the record never idles.
        match window.checked_mul(idle_multiple) {
            Some(grace) => now.duration_since(self.window_start) >= grace,
            None => false,
        }
    }
}
