//! Rolling-window call quotas per source.
//!
//! [`RateLimiter::acquire`] never waits: it either grants a [`Permit`] or
//! returns [`RateLimited`] with the time until the oldest call in the window
//! expires. Callers decide whether to wait or give up for this run.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use trendbot_core::{AppConfig, Source};

/// Allowed calls per rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub max_calls: u32,
    pub window: Duration,
}

/// Proof that one outbound call to `source` was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    pub source: Source,
    /// Calls still available in the current window after this one.
    pub remaining: u32,
}

/// Back-pressure signal: the quota for `source` is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub source: Source,
    pub retry_after: Duration,
}

impl std::fmt::Display for RateLimited {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rate limited; retry after {}s",
            self.source,
            self.retry_after.as_secs()
        )
    }
}

impl std::error::Error for RateLimited {}

#[derive(Debug)]
struct Window {
    quota: Quota,
    calls: VecDeque<Instant>,
}

impl Window {
    fn new(quota: Quota) -> Self {
        Self {
            quota,
            calls: VecDeque::new(),
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) >= self.quota.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Thread-safe per-source call tracker.
///
/// Sources without a configured quota are never limited.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<Source, Window>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a limiter with the quota configured for every source.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let limiter = Self::new();
        for source in Source::ALL {
            let settings = config.source_settings(source);
            limiter.set_quota(
                source,
                Quota {
                    max_calls: settings.rate_max_calls,
                    window: Duration::from_secs(settings.rate_window_secs),
                },
            );
        }
        limiter
    }

    /// Install or replace the quota for `source`, forgetting past calls.
    pub fn set_quota(&self, source: Source, quota: Quota) {
        self.lock().insert(source, Window::new(quota));
    }

    /// Builder form of [`RateLimiter::set_quota`].
    #[must_use]
    pub fn with_quota(self, source: Source, max_calls: u32, window: Duration) -> Self {
        self.set_quota(source, Quota { max_calls, window });
        self
    }

    /// Try to admit one call to `source`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] when the rolling window is full. A quota of
    /// zero calls always reports the full window as `retry_after`.
    pub fn acquire(&self, source: Source) -> Result<Permit, RateLimited> {
        let now = Instant::now();
        let mut windows = self.lock();

        let Some(window) = windows.get_mut(&source) else {
            return Ok(Permit {
                source,
                remaining: u32::MAX,
            });
        };

        window.evict_expired(now);

        let used = u32::try_from(window.calls.len()).unwrap_or(u32::MAX);
        if used >= window.quota.max_calls {
            let retry_after = window.calls.front().map_or(window.quota.window, |&oldest| {
                window
                    .quota
                    .window
                    .saturating_sub(now.duration_since(oldest))
            });
            return Err(RateLimited {
                source,
                retry_after,
            });
        }

        window.calls.push_back(now);
        Ok(Permit {
            source,
            remaining: window.quota.max_calls - used - 1,
        })
    }

    /// Calls still available to `source` right now, or `None` if unlimited.
    #[must_use]
    pub fn remaining(&self, source: Source) -> Option<u32> {
        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows.get_mut(&source)?;
        window.evict_expired(now);
        let used = u32::try_from(window.calls.len()).unwrap_or(u32::MAX);
        Some(window.quota.max_calls.saturating_sub(used))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Source, Window>> {
        // Plain counters; a poisoned guard is still consistent.
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn grants_up_to_quota_then_limits() {
        let limiter = RateLimiter::new().with_quota(Source::Github, 2, Duration::from_secs(60));

        assert_eq!(limiter.acquire(Source::Github).unwrap().remaining, 1);
        assert_eq!(limiter.acquire(Source::Github).unwrap().remaining, 0);

        let denied = limiter.acquire(Source::Github).unwrap_err();
        assert_eq!(denied.source, Source::Github);
        assert_eq!(denied.retry_after, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn window_rolls_forward() {
        let limiter = RateLimiter::new().with_quota(Source::Reddit, 1, Duration::from_secs(60));
        limiter.acquire(Source::Reddit).unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        let denied = limiter.acquire(Source::Reddit).unwrap_err();
        assert_eq!(denied.retry_after, Duration::from_secs(15));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(limiter.acquire(Source::Reddit).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sources_are_independent() {
        let limiter = RateLimiter::new()
            .with_quota(Source::Twitter, 1, Duration::from_secs(900))
            .with_quota(Source::Hackernews, 1, Duration::from_secs(60));

        limiter.acquire(Source::Twitter).unwrap();
        assert!(limiter.acquire(Source::Twitter).is_err());
        assert!(limiter.acquire(Source::Hackernews).is_ok());
    }

    #[tokio::test]
    async fn unconfigured_source_is_unlimited() {
        let limiter = RateLimiter::new();
        for _ in 0..100 {
            assert!(limiter.acquire(Source::Hackernews).is_ok());
        }
        assert_eq!(limiter.remaining(Source::Hackernews), None);
    }

    #[tokio::test]
    async fn zero_quota_always_denies() {
        let limiter = RateLimiter::new().with_quota(Source::Twitter, 0, Duration::from_secs(30));
        let denied = limiter.acquire(Source::Twitter).unwrap_err();
        assert_eq!(denied.retry_after, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_never_exceed_quota() {
        let limiter = Arc::new(RateLimiter::new().with_quota(
            Source::Github,
            5,
            Duration::from_secs(60),
        ));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire(Source::Github).is_ok()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
        assert_eq!(limiter.remaining(Source::Github), Some(0));
    }
}
