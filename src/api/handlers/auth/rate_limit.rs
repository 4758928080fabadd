//! Rate limiting primitives for the auth endpoint.
//!
//! The budget is a fixed window per client origin: the first request from an
//! origin opens a window of `window` length, every request inside it consumes
//! one unit, and the counter starts over once the window has elapsed. Bursts
//! straddling a window boundary can therefore reach twice the quota.
//!
//! Origins are bucketed before counting: IPv4-mapped IPv6 peers count as their
//! IPv4 address, and IPv6 addresses share the budget of their /64 prefix since
//! a single host usually controls the whole /64.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv6Addr},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Budget of one origin right after a request was counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the origin's current window ends.
    pub reset_after: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Rate limiting is disabled.
    Unlimited,
    Allowed(RateLimitStatus),
    Limited(RateLimitStatus),
}

impl RateLimitDecision {
    #[must_use]
    pub fn status(&self) -> Option<RateLimitStatus> {
        match self {
            Self::Unlimited => None,
            Self::Allowed(status) | Self::Limited(status) => Some(*status),
        }
    }
}

/// Bucket key for `origin`: canonical IPv4, or the /64 network of an IPv6 address.
#[must_use]
pub fn origin_key(origin: IpAddr) -> IpAddr {
    match origin.to_canonical() {
        IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6) & (u128::MAX << 64))),
        v4 => v4,
    }
}

pub trait RateLimiter: Send + Sync {
    /// Count one request from `origin` and decide whether it may proceed.
    fn check(&self, origin: IpAddr) -> RateLimitDecision;

    /// Drop bookkeeping that no longer affects any decision.
    fn prune(&self) {}
}

/// Time source for window bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Copy, Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

pub struct FixedWindowRateLimiter {
    quota: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(quota: u32, window: Duration) -> Self {
        Self::with_clock(quota, window, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(quota: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            quota,
            window,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn quota(&self) -> u32 {
        self.quota
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of origins currently tracked.
    #[must_use]
    pub fn tracked_origins(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for FixedWindowRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowRateLimiter")
            .field("quota", &self.quota)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check(&self, origin: IpAddr) -> RateLimitDecision {
        if self.quota == 0 {
            return RateLimitDecision::Unlimited;
        }

        let now = self.clock.now();
        // A poisoned map still holds valid counters; keep counting.
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = windows.entry(origin_key(origin)).or_insert(Window {
            started_at: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(entry.started_at);
        if elapsed >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        entry.count = entry.count.saturating_add(1);

        let status = RateLimitStatus {
            limit: self.quota,
            remaining: self.quota.saturating_sub(entry.count),
            reset_after: self
                .window
                .saturating_sub(now.saturating_duration_since(entry.started_at)),
        };

        if entry.count > self.quota {
            RateLimitDecision::Limited(status)
        } else {
            RateLimitDecision::Allowed(status)
        }
    }

    fn prune(&self) {
        let now = self.clock.now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.retain(|_, window| now.saturating_duration_since(window.started_at) < self.window);
    }
}

/// Limiter used when rate limiting is disabled (quota of zero).
#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _origin: IpAddr) -> RateLimitDecision {
        RateLimitDecision::Unlimited
    }
}
