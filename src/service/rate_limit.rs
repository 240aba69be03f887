use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::service::ServiceError;

/// Sliding-window limiter keyed by API key.
///
/// Each key owns the timestamps of its accepted requests. The DashMap entry
/// guard is held for the whole prune-check-append step, so admissions for
/// one key are serialized.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    requests: DashMap<String, VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            requests: DashMap::new(),
        }
    }

    /// Records `now` for `key` if it has budget left. Rejected attempts are
    /// not recorded.
    pub fn admit(&self, key: &str, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let mut timestamps = self.requests.entry(key.to_string()).or_default();
        prune(&mut timestamps, now, self.window);

        if timestamps.len() >= self.limit {
            warn!(requests = timestamps.len(), limit = self.limit, "Rate limit exceeded");
            return Err(ServiceError::RateLimitExceeded);
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Unused budget for `key` at `now`.
    pub fn remaining(&self, key: &str, now: DateTime<Utc>) -> usize {
        let used = self
            .requests
            .get(key)
            .map(|timestamps| timestamps.iter().filter(|&&t| now - t < self.window).count())
            .unwrap_or(0);
        self.limit.saturating_sub(used)
    }

    /// Drops keys with no request inside the window. Returns how many went.
    pub fn purge_idle(&self, now: DateTime<Utc>) -> usize {
        let before = self.requests.len();
        self.requests.retain(|_, timestamps| {
            prune(timestamps, now, self.window);
            !timestamps.is_empty()
        });
        let purged = before.saturating_sub(self.requests.len());
        if purged > 0 {
            debug!(purged, "Purged idle rate-limit keys");
        }
        purged
    }

    #[cfg(test)]
    pub fn tracked_keys(&self) -> usize {
        self.requests.len()
    }
}

fn prune(timestamps: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) {
    timestamps.retain(|&t| now - t < window);
}

#[cfg(test)]
impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(100, Duration::hours(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 24, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_101st_request_is_rejected() {
        let limiter = RateLimiter::default();
        let now = start();

        for i in 0..100 {
            assert!(limiter.admit("key", now + Duration::seconds(i)).is_ok());
        }
        assert_eq!(
            limiter.admit("key", now + Duration::seconds(100)),
            Err(ServiceError::RateLimitExceeded)
        );
        assert_eq!(limiter.remaining("key", now + Duration::seconds(100)), 0);
    }

    #[test]
    fn test_window_expiry_readmits() {
        let limiter = RateLimiter::new(2, Duration::hours(1));
        let now = start();

        limiter.admit("key", now).unwrap();
        limiter.admit("key", now + Duration::minutes(30)).unwrap();
        assert!(limiter.admit("key", now + Duration::minutes(59)).is_err());

        // exactly one window after the first request, it no longer counts
        assert!(limiter.admit("key", now + Duration::hours(1)).is_ok());
        assert_eq!(limiter.remaining("key", now + Duration::hours(1)), 0);
        assert_eq!(limiter.remaining("key", now + Duration::minutes(91)), 1);
    }

    #[test]
    fn test_rejections_do_not_consume_budget() {
        let limiter = RateLimiter::new(1, Duration::minutes(10));
        let now = start();

        limiter.admit("key", now).unwrap();
        for i in 1..5 {
            assert!(limiter.admit("key", now + Duration::minutes(i)).is_err());
        }
        assert!(limiter.admit("key", now + Duration::minutes(10)).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::hours(1));
        let now = start();

        limiter.admit("a", now).unwrap();
        assert!(limiter.admit("a", now).is_err());
        assert!(limiter.admit("b", now).is_ok());
        assert_eq!(limiter.remaining("c", now), 1);
    }

    #[test]
    fn test_purge_idle() {
        let limiter = RateLimiter::new(10, Duration::hours(1));
        let now = start();

        limiter.admit("old", now).unwrap();
        limiter.admit("recent", now + Duration::minutes(50)).unwrap();
        assert_eq!(limiter.tracked_keys(), 2);

        assert_eq!(limiter.purge_idle(now + Duration::minutes(70)), 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.remaining("recent", now + Duration::minutes(70)), 9);
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_limit() {
        let limiter = RateLimiter::new(100, Duration::hours(1));
        let accepted = AtomicUsize::new(0);
        let now = start();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        if limiter.admit("shared", now).is_ok() {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(accepted.load(Ordering::SeqCst), 100);
    }
}
