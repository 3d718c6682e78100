//! Gateway middleware.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
};

/// Checks between sweeps of idle keys.
const PRUNE_INTERVAL: u64 = 1024;

/// Per-identifier limiter for login attempts.
///
/// Keys whose quota has fully refilled are dropped every
/// [`PRUNE_INTERVAL`] checks, so the map tracks only recent callers.
pub struct LoginRateLimiter<C: Clock = DefaultClock> {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<C::Instant>>,
    checks: AtomicU64,
}

impl LoginRateLimiter {
    /// Allow `attempts_per_minute` attempts per identifier.
    #[must_use]
    pub fn new(attempts_per_minute: u32) -> Self {
        Self::with_clock(attempts_per_minute, DefaultClock::default())
    }
}

impl<C: Clock> LoginRateLimiter<C> {
    /// Same as [`LoginRateLimiter::new`] with an explicit clock.
    #[must_use]
    pub fn with_clock(attempts_per_minute: u32, clock: C) -> Self {
        let quota =
            Quota::per_minute(NonZeroU32::new(attempts_per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::new(quota, DefaultKeyedStateStore::default(), clock),
            checks: AtomicU64::new(0),
        }
    }

    /// Record an attempt for `key`; `false` once the quota is spent.
    #[must_use]
    pub fn check(&self, key: &str) -> bool {
        let allowed = self.limiter.check_key(&key.to_string()).is_ok();

        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_INTERVAL == PRUNE_INTERVAL - 1 {
            self.prune();
        }
        allowed
    }

    /// Drop keys that are back to a full quota.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of identifiers currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(10)
    }
}

impl<C: Clock> std::fmt::Debug for LoginRateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRateLimiter")
            .field("tracked_keys", &self.tracked_keys())
            .finish_non_exhaustive()
    }
}
