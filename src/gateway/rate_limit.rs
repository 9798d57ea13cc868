use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Window every per-minute budget is counted over.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter. Per-IP request tracking.
pub struct SlidingWindowRateLimiter {
    limit: u32,
    window: Duration,
    entries: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, VecDeque<Instant>>> {
        // Counters stay usable even if a holder panicked.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while timestamps
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= window)
        {
            timestamps.pop_front();
        }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    /// A limit of 0 means unlimited (always allows).
    pub fn check(&self, ip: IpAddr) -> bool {
        if self.limit == 0 {
            return true;
        }

        let now = Instant::now();
        let mut entries = self.lock();
        let timestamps = entries.entry(ip).or_default();

        Self::prune(timestamps, now, self.window);

        if timestamps.len() >= self.limit as usize {
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Remove IPs with no active timestamps (call periodically).
    pub fn sweep(&self) {
        let now = Instant::now();
        let window = self.window;
        self.lock().retain(|_, timestamps| {
            Self::prune(timestamps, now, window);
            !timestamps.is_empty()
        });
    }

    /// Number of tracked IPs.
    pub fn entry_count(&self) -> usize {
        self.lock().len()
    }
}

/// Which budget rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    General,
    Send,
}

/// Combined rate limiter for the REST surface.
///
/// Every request draws from the general budget. Send endpoints also draw
/// from the send budget.
pub struct ApiRateLimiter {
    general: SlidingWindowRateLimiter,
    send: SlidingWindowRateLimiter,
}

impl ApiRateLimiter {
    pub fn new(requests_per_min: u32, send_per_min: u32, window: Duration) -> Self {
        Self {
            general: SlidingWindowRateLimiter::new(requests_per_min, window),
            send: SlidingWindowRateLimiter::new(send_per_min, window),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_minute, config.send_per_minute, WINDOW)
    }

    /// Check a request. The send budget is only touched when the general
    /// budget allowed it.
    pub fn check(&self, ip: IpAddr, is_send: bool) -> Result<(), LimitScope> {
        if !self.general.check(ip) {
            return Err(LimitScope::General);
        }
        if is_send && !self.send.check(ip) {
            return Err(LimitScope::Send);
        }
        Ok(())
    }

    pub fn sweep(&self) {
        self.general.sweep();
        self.send.sweep();
    }

    pub fn entry_count(&self) -> usize {
        self.general.entry_count() + self.send.entry_count()
    }
}
