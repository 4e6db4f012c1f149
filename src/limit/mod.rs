//! Sliding-window rate limiting keyed by client identifier
//!
//! Each client gets a queue of admission timestamps. Timestamps that fall out
//! of the window are pruned before every check, and idle clients are dropped
//! by [`RateLimiter::sweep`] so the map does not grow without bound.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Call budget for one route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
    /// Calls admitted per window
    pub max_calls: usize,
    /// Window length in seconds
    pub period_secs: u64,
}

impl RatePolicy {
    pub const fn new(max_calls: usize, period_secs: u64) -> Self {
        Self {
            max_calls,
            period_secs,
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// Process-local admission gate shared across requests
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one call for `client` if it has fewer than `max_calls` within `period`
    pub fn admit(&self, client: &str, max_calls: usize, period: Duration) -> bool {
        self.admit_at(client, max_calls, period, Instant::now())
    }

    /// Admit one call under a route policy
    pub fn check(&self, client: &str, policy: &RatePolicy) -> bool {
        self.admit(client, policy.max_calls, policy.period())
    }

    /// Admission check against an explicit clock reading.
    ///
    /// Rejected attempts are not recorded, so a client hammering the route
    /// gets back in as soon as its oldest admitted call leaves the window.
    pub fn admit_at(&self, client: &str, max_calls: usize, period: Duration, now: Instant) -> bool {
        self.try_admit_at(client, max_calls, period, now).is_ok()
    }

    /// Like [`RateLimiter::admit_at`], but a rejection carries how long until
    /// the oldest admitted call leaves the window.
    pub fn try_admit_at(
        &self,
        client: &str,
        max_calls: usize,
        period: Duration,
        now: Instant,
    ) -> std::result::Result<(), Duration> {
        let mut windows = self.windows.lock();
        let window = windows.entry(client.to_string()).or_default();
        prune(window, now, period);

        if window.len() >= max_calls {
            let wait = window
                .front()
                .map(|oldest| period.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(period);
            return Err(wait);
        }
        window.push_back(now);
        Ok(())
    }

    /// Drop clients with no admitted call inside `period`. Returns how many were removed.
    pub fn sweep(&self, period: Duration) -> usize {
        self.sweep_at(period, Instant::now())
    }

    pub fn sweep_at(&self, period: Duration, now: Instant) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, window| {
            prune(window, now, period);
            !window.is_empty()
        });
        before - windows.len()
    }

    /// Number of clients currently tracked
    pub fn len(&self) -> usize {
        self.windows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.lock().is_empty()
    }
}

/// A limiter bound to one route's policy
#[derive(Debug)]
pub struct RouteLimit {
    limiter: RateLimiter,
    policy: RatePolicy,
}

impl RouteLimit {
    pub fn new(policy: RatePolicy) -> Self {
        Self {
            limiter: RateLimiter::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &RatePolicy {
        &self.policy
    }

    /// Admit one call, or return how long the client has to wait
    pub fn check(&self, client: &str) -> std::result::Result<(), Duration> {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> std::result::Result<(), Duration> {
        self.limiter.try_admit_at(
            client,
            self.policy.max_calls,
            self.policy.period(),
            now,
        )
    }

    pub fn sweep(&self) -> usize {
        self.limiter.sweep(self.policy.period())
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, period: Duration) {
    while let Some(&oldest) = window.front() {
        if now.saturating_duration_since(oldest) >= period {
            window.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const PERIOD: Duration = Duration::from_secs(60);

    #[test]
    fn test_budget_boundary() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.admit_at("10.0.0.1", 3, PERIOD, now));
        }
        assert!(!limiter.admit_at("10.0.0.1", 3, PERIOD, now));
    }

    #[test]
    fn test_window_elapses() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        assert!(limiter.admit_at("c", 2, PERIOD, start));
        assert!(limiter.admit_at("c", 2, PERIOD, start + Duration::from_secs(10)));
        assert!(!limiter.admit_at("c", 2, PERIOD, start + Duration::from_secs(30)));

        // Oldest call leaves the window exactly one period after it was made
        assert!(limiter.admit_at("c", 2, PERIOD, start + PERIOD));
        assert!(!limiter.admit_at("c", 2, PERIOD, start + PERIOD + Duration::from_secs(1)));
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        assert!(limiter.admit_at("c", 1, PERIOD, start));
        for i in 1..50 {
            assert!(!limiter.admit_at("c", 1, PERIOD, start + Duration::from_secs(i)));
        }
        assert!(limiter.admit_at("c", 1, PERIOD, start + PERIOD));
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(limiter.admit_at("a", 1, PERIOD, now));
        assert!(!limiter.admit_at("a", 1, PERIOD, now));
        assert!(limiter.admit_at("b", 1, PERIOD, now));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_check_uses_policy() {
        let limiter = RateLimiter::new();
        let policy = RatePolicy::new(2, 60);

        assert!(limiter.check("c", &policy));
        assert!(limiter.check("c", &policy));
        assert!(!limiter.check("c", &policy));
    }

    #[test]
    fn test_sweep_drops_idle_clients() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        limiter.admit_at("old", 5, PERIOD, start);
        limiter.admit_at("recent", 5, PERIOD, start + Duration::from_secs(50));

        let removed = limiter.sweep_at(PERIOD, start + Duration::from_secs(70));
        assert_eq!(removed, 1);
        assert_eq!(limiter.len(), 1);

        let removed = limiter.sweep_at(PERIOD, start + Duration::from_secs(200));
        assert_eq!(removed, 1);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_route_limit() {
        let route = RouteLimit::new(RatePolicy::new(1, 60));
        assert!(route.check("a").is_ok());
        assert!(route.check("a").is_err());
        assert!(route.check("b").is_ok());
        assert_eq!(route.tracked_clients(), 2);
        // Both windows are still live
        assert_eq!(route.sweep(), 0);
    }

    #[test]
    fn test_rejection_reports_remaining_wait() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        assert!(limiter.try_admit_at("c", 2, PERIOD, start).is_ok());
        assert!(limiter
            .try_admit_at("c", 2, PERIOD, start + Duration::from_secs(20))
            .is_ok());

        let wait = limiter
            .try_admit_at("c", 2, PERIOD, start + Duration::from_secs(45))
            .unwrap_err();
        assert_eq!(wait, Duration::from_secs(15));
    }

    #[test]
    fn test_route_limit_wait_shrinks() {
        let route = RouteLimit::new(RatePolicy::new(1, 60));
        let start = Instant::now();

        assert!(route.check_at("a", start).is_ok());
        assert_eq!(route.check_at("a", start), Err(PERIOD));
        assert_eq!(
            route.check_at("a", start + Duration::from_secs(59)),
            Err(Duration::from_secs(1))
        );
        assert!(route.check_at("a", start + PERIOD).is_ok());
    }

    #[test]
    fn test_concurrent_admission_respects_budget() {
        let limiter = Arc::new(RateLimiter::new());
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.admit("shared", 10, PERIOD))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 10);
    }
}
