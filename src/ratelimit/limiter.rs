//! Core rate limiter implementation.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::LimiterConfig;

use super::key::RecordKey;
use super::policy::{Policy, PolicyTable};
use super::record::{Decision, RateLimitRecord};

/// The core rate limiter that manages per-identity request records.
///
/// This struct is thread-safe and can be shared across multiple tasks. The
/// record map is sharded, so the read-modify-write for one key is serialized
/// while unrelated identities proceed independently.
pub struct RateLimiter {
    /// Request records indexed by (policy, identity) key
    records: DashMap<RecordKey, RateLimitRecord>,
    /// Named policies, fixed at construction
    policies: PolicyTable,
    /// Housekeeping knobs (sweep interval, idle grace)
    housekeeping: LimiterConfig,
    /// When the last eviction sweep ran
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a new rate limiter enforcing the given policy table.
    pub fn new(policies: PolicyTable, housekeeping: LimiterConfig) -> Self {
        Self {
            records: DashMap::new(),
            policies,
            housekeeping,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Look up a configured policy by name.
    pub fn policy(&self, name: &str) -> Option<Policy> {
        self.policies.get(name)
    }

    /// Check one request from `identity` against the named policy.
    ///
    /// Returns `None` when no policy with that name is configured. An
    /// allowed request consumes one slot of the identity's budget; a denied
    /// request consumes nothing.
    pub fn check(&self, policy_name: &str, identity: &str) -> Option<Decision> {
        let policy = self.policies.get(policy_name)?;
        Some(self.check_policy(policy_name, policy, identity))
    }

    /// Check one request against an already-resolved policy.
    pub fn check_policy(&self, policy_name: &str, policy: Policy, identity: &str) -> Decision {
        let now = Instant::now();
        let decision = self.check_at(policy_name, policy, identity, now);
        self.maybe_sweep(now);
        decision
    }

    /// Run the check at an explicit point in time.
    fn check_at(&self, policy_name: &str, policy: Policy, identity: &str, now: Instant) -> Decision {
        let key = RecordKey::new(policy_name, identity);

        trace!(key = %key, "Checking rate limit");

        // The entry guard holds the shard lock, making the observe below
        // atomic with respect to other requests for the same key.
        let mut record = self.records.entry(key.clone()).or_insert_with(|| {
            debug!(
                key = %key,
                max_requests = policy.max_requests(),
                window = ?policy.window(),
                "Creating new rate limit record"
            );
            RateLimitRecord::new(now)
        });

        let decision = record.observe(&policy, now);

        if !decision.allowed {
            debug!(
                key = %key,
                retry_after = ?decision.retry_after,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Run an eviction sweep if enough time has passed since the last one.
    ///
    /// Uses `try_lock` so at most one request pays for the sweep and the
    /// rest carry on.
    fn maybe_sweep(&self, now: Instant) {
        let interval = Duration::from_secs(self.housekeeping.sweep_interval_secs);

        let Some(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last_sweep) < interval {
            return;
        }
        *last_sweep = now;
        drop(last_sweep);

        self.sweep_at(now);
    }

    /// Drop records idle beyond the grace multiple of their policy's window.
    ///
    /// Records whose policy is no longer configured are dropped outright.
    fn sweep_at(&self, now: Instant) {
        let idle_multiple = self.housekeeping.idle_window_multiple;
        let before = self.records.len();

        self.records.retain(|key, record| {
            match self.policies.get(&key.policy) {
                Some(policy) => !record.is_idle(policy.window(), idle_multiple, now),
                None => false,
            }
        });

        // Concurrent inserts can grow the map while retain walks the
        // shards, so the final length may exceed the snapshot.
        let evicted = before.saturating_sub(self.records.len());
        if evicted > 0 {
            debug!(
                evicted,
                remaining = self.records.len(),
                "Evicted idle rate limit records"
            );
        }
    }

    /// Get the current count for a (policy, identity) pair.
    ///
    /// Returns `None` if no record exists for the key.
    pub fn record_value(&self, policy_name: &str, identity: &str) -> Option<u32> {
        let key = RecordKey::new(policy_name, identity);
        self.records.get(&key).map(|r| r.count())
    }

    /// Clear all records.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.records.clear();
    }

    /// Get the number of active records.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_limiter() -> RateLimiter {
        let table =
            PolicyTable::from_yaml("login: { max_requests: 5, window_ms: 60000 }").unwrap();
        RateLimiter::new(table, LimiterConfig::default())
    }

    #[test]
    fn test_unknown_policy_returns_none() {
        let limiter = login_limiter();
        assert!(limiter.check("signup", "1.2.3.4").is_none());
        assert_eq!(limiter.record_count(), 0);
    }

    #[test]
    fn test_check_creates_record() {
        let limiter = login_limiter();

        let decision = limiter.check("login", "1.2.3.4").unwrap();
        assert!(decision.allowed);
        assert_eq!(limiter.record_count(), 1);
        assert_eq!(limiter.record_value("login", "1.2.3.4"), Some(1));
    }

    #[test]
    fn test_login_scenario() {
        let limiter = login_limiter();
        let policy = limiter.policy("login").unwrap();
        let start = Instant::now();

        // Five requests inside one window pass with a shrinking budget.
        for expected in (0..5).rev() {
            let decision = limiter.check_at("login", policy, "1.2.3.4", start);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
        }

        // The sixth is denied and told how long the window has left.
        let decision = limiter.check_at("login", policy, "1.2.3.4", start);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after, Duration::from_millis(60_000));

        // Past the window edge the budget is fresh again.
        let after_window = start + Duration::from_millis(60_001);
        let decision = limiter.check_at("login", policy, "1.2.3.4", after_window);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = login_limiter();
        let policy = limiter.policy("login").unwrap();
        let start = Instant::now();

        for _ in 0..6 {
            limiter.check_at("login", policy, "1.2.3.4", start);
        }
        assert!(!limiter.check_at("login", policy, "1.2.3.4", start).allowed);

        // Another identity still has its full budget.
        let decision = limiter.check_at("login", policy, "5.6.7.8", start);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn test_denied_requests_do_not_consume_budget() {
        let limiter = login_limiter();
        let policy = limiter.policy("login").unwrap();
        let start = Instant::now();

        for _ in 0..5 {
            limiter.check_at("login", policy, "1.2.3.4", start);
        }

        // Spamming past the limit must not move the reset point or count.
        for _ in 0..20 {
            assert!(!limiter.check_at("login", policy, "1.2.3.4", start).allowed);
        }
        assert_eq!(limiter.record_value("login", "1.2.3.4"), Some(5));

        let after_window = start + Duration::from_millis(60_001);
        assert!(limiter.check_at("login", policy, "1.2.3.4", after_window).allowed);
    }

    #[test]
    fn test_concurrent_checks_allow_exactly_budget() {
        let limiter = login_limiter();

        let mut allowed = 0;
        let mut denied = 0;
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..10)
                .map(|_| s.spawn(|| limiter.check("login", "1.2.3.4").unwrap().allowed))
                .collect();

            for handle in handles {
                if handle.join().unwrap() {
                    allowed += 1;
                } else {
                    denied += 1;
                }
            }
        });

        assert_eq!(allowed, 5);
        assert_eq!(denied, 5);
        assert_eq!(limiter.record_value("login", "1.2.3.4"), Some(5));
    }

    #[test]
    fn test_sweep_evicts_idle_records() {
        let limiter = login_limiter();
        let policy = limiter.policy("login").unwrap();
        let start = Instant::now();

        limiter.check_at("login", policy, "1.2.3.4", start);
        limiter.check_at("login", policy, "5.6.7.8", start);
        assert_eq!(limiter.record_count(), 2);

        // One identity stays active; the other goes quiet.
        let later = start + Duration::from_millis(300_000);
        limiter.check_at("login", policy, "5.6.7.8", later);

        // Default grace is eight windows.
        limiter.sweep_at(start + Duration::from_millis(480_000));
        assert_eq!(limiter.record_count(), 1);
        assert!(limiter.record_value("login", "1.2.3.4").is_none());
        assert!(limiter.record_value("login", "5.6.7.8").is_some());
    }

    #[test]
    fn test_sweep_concurrent_with_inserts() {
        let limiter = login_limiter();
        let policy = limiter.policy("login").unwrap();
        let start = Instant::now();

        // Churn the map while sweeping: nothing is idle at `start`, so the
        // sweep removes nothing while inserts keep growing the map under it.
        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..100 {
                    limiter.clear();
                    for i in 0..16 {
                        limiter.check_at("login", policy, &format!("10.0.0.{}", i), start);
                    }
                }
            });

            for _ in 0..200 {
                limiter.sweep_at(start);
            }
        });
    }

    #[test]
    fn test_clear_records() {
        let limiter = login_limiter();
        limiter.check("login", "1.2.3.4");
        assert_eq!(limiter.record_count(), 1);

        limiter.clear();
        assert_eq!(limiter.record_count(), 0);
    }
}
