//! Sliding-window rate limiting for calls to one search endpoint.
//!
//! The limiter keeps the admission timestamps that fall inside the trailing
//! window. A caller is admitted when fewer than `max_requests` timestamps
//! remain; otherwise it sleeps until the oldest timestamp leaves the window
//! and tries again. Waiters are served strictly in arrival order.
//!
//! The window is half-open: at time `now` it covers `(now - window, now]`.
//! A slot admitted at `t` stops counting at exactly `t + window`, so any
//! half-open interval of length `window` holds at most `max_requests`
//! admissions.
//!
//! Admission hands back a [`RatePermit`]. Committing the permit marks the
//! slot as used; dropping it uncommitted (the call was short-circuited or
//! cancelled before reaching the transport) gives the slot back.
//!
//! # Example
//!
//! ```no_run
//! use search_pager::resilience::rate_limit::{RateLimitConfig, RateLimiter};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(RateLimitConfig::new(10, Duration::from_secs(1)));
//!
//! let permit = limiter.acquire().await;
//! permit.commit();
//! // issue the request
//! # }
//! ```

use metrics::counter;
use search_pager_core::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum admissions inside any trailing window
    pub max_requests: u32,
    /// Length of the sliding window
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 50,
            window: Duration::from_secs(1),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(SearchError::Configuration(
                "rate limit max_requests must be greater than 0".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(SearchError::Configuration(
                "rate limit window must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Snapshot of the current window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Admissions still available right now
    pub remaining: u32,
    pub limit: u32,
    /// How long until the next slot frees up, when none are available
    pub retry_after: Option<Duration>,
}

struct Slot {
    id: u64,
    admitted_at: Instant,
}

/// Sliding-window limiter shared by every caller of one endpoint.
pub struct RateLimiter {
    name: String,
    config: RateLimitConfig,
    /// Queues waiters in FIFO order; only the head of the line inspects the window.
    turnstile: tokio::sync::Mutex<()>,
    window: Mutex<VecDeque<Slot>>,
    next_id: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::named("default", config)
    }

    pub fn named(name: impl Into<String>, config: RateLimitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            turnstile: tokio::sync::Mutex::new(()),
            window: Mutex::new(VecDeque::with_capacity(config.max_requests as usize)),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn lock_window(&self) -> MutexGuard<'_, VecDeque<Slot>> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops slots admitted at or before `now - window`.
    fn prune(&self, window: &mut VecDeque<Slot>, now: Instant) {
        while let Some(front) = window.front() {
            if now.saturating_duration_since(front.admitted_at) >= self.config.window {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Either records a slot and returns its id, or reports how long to wait.
    fn try_admit(&self) -> std::result::Result<u64, Duration> {
        let now = Instant::now();
        let mut window = self.lock_window();
        self.prune(&mut window, now);

        if window.len() < self.config.max_requests as usize {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            window.push_back(Slot {
                id,
                admitted_at: now,
            });
            Ok(id)
        } else {
            let oldest = window
                .front()
                .map(|slot| slot.admitted_at)
                .unwrap_or(now);
            Err((oldest + self.config.window).saturating_duration_since(now))
        }
    }

    /// Waits until the call may proceed.
    pub async fn acquire(&self) -> RatePermit<'_> {
        let _turn = self.turnstile.lock().await;
        let mut waited = false;

        loop {
            match self.try_admit() {
                Ok(id) => {
                    return RatePermit {
                        limiter: self,
                        id,
                        committed: false,
                    }
                }
                Err(wait) => {
                    if !waited {
                        counter!("search_rate_limit_waits_total", "endpoint" => self.name.clone())
                            .increment(1);
                        waited = true;
                    }
                    debug!(endpoint = %self.name, ?wait, "Rate limit reached, waiting for a slot");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Admits without waiting, or returns `None` when the window is full or
    /// other callers are already queued.
    pub fn try_acquire(&self) -> Option<RatePermit<'_>> {
        let _turn = self.turnstile.try_lock().ok()?;
        self.try_admit().ok().map(|id| RatePermit {
            limiter: self,
            id,
            committed: false,
        })
    }

    /// Number of admissions currently inside the window.
    pub fn in_window(&self) -> usize {
        let mut window = self.lock_window();
        self.prune(&mut window, Instant::now());
        window.len()
    }

    pub fn info(&self) -> RateLimitInfo {
        let now = Instant::now();
        let mut window = self.lock_window();
        self.prune(&mut window, now);

        let used = window.len() as u32;
        let remaining = self.config.max_requests.saturating_sub(used);
        let retry_after = if remaining == 0 {
            window
                .front()
                .map(|slot| (slot.admitted_at + self.config.window).saturating_duration_since(now))
        } else {
            None
        };

        RateLimitInfo {
            remaining,
            limit: self.config.max_requests,
            retry_after,
        }
    }

    fn release(&self, id: u64) {
        let mut window = self.lock_window();
        if let Some(pos) = window.iter().position(|slot| slot.id == id) {
            window.remove(pos);
            debug!(endpoint = %self.name, "Released unused rate limit slot");
        }
    }
}

/// An admitted slot. Dropping it without [`commit`](RatePermit::commit)
/// returns the slot to the window.
#[must_use = "an uncommitted permit releases its slot when dropped"]
pub struct RatePermit<'a> {
    limiter: &'a RateLimiter,
    id: u64,
    committed: bool,
}

impl RatePermit<'_> {
    /// Marks the slot as spent on a real call.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for RatePermit<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.limiter.release(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::advance;

    #[test]
    fn test_config_validation() {
        assert!(RateLimitConfig::default().validate().is_ok());
        assert!(RateLimitConfig::new(0, Duration::from_secs(1)).validate().is_err());
        assert!(RateLimitConfig::new(5, Duration::ZERO).validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_limit_immediately() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, Duration::from_secs(1)));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await.commit();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window(), 3);
        assert_eq!(limiter.info().remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_stops_counting_exactly_one_window_later() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_millis(1000)));

        limiter.acquire().await.commit();
        advance(Duration::from_millis(999)).await;
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.info().retry_after, Some(Duration::from_millis(1)));

        advance(Duration::from_millis(1)).await;
        limiter.try_acquire().expect("slot is free").commit();
        assert_eq!(limiter.in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_oldest_to_leave_window() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_millis(1000)));

        limiter.acquire().await.commit();
        advance(Duration::from_millis(300)).await;
        limiter.acquire().await.commit();

        let start = Instant::now();
        limiter.acquire().await.commit();

        // the first admission leaves the window 700ms from here
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_does_not_wait() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(1)));

        limiter.try_acquire().unwrap().commit();
        assert!(limiter.try_acquire().is_none());

        let info = limiter.info();
        assert_eq!(info.remaining, 0);
        assert_eq!(info.retry_after, Some(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncommitted_permit_releases_slot() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(10)));

        drop(limiter.acquire().await);

        assert_eq!(limiter.in_window(), 0);
        assert!(limiter.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_takes_no_slot() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(1)));
        limiter.acquire().await.commit();

        let waited =
            tokio::time::timeout(Duration::from_millis(100), limiter.acquire()).await;
        assert!(waited.is_err());
        assert_eq!(limiter.in_window(), 1);

        advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.in_window(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_bound_under_concurrency() {
        let window = Duration::from_millis(500);
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(4, window)));
        let mut handles = Vec::new();

        for _ in 0..25 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await.commit();
                Instant::now()
            }));
        }

        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap());
        }
        admitted.sort();

        for (i, start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            assert!(in_window <= 4, "{} admissions inside one window", in_window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_are_admitted_in_arrival_order() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(
            1,
            Duration::from_millis(100),
        )));
        let order = Arc::new(Mutex::new(Vec::new()));
        limiter.acquire().await.commit();

        let mut handles = Vec::new();
        for i in 0..5 {
            let limiter = Arc::clone(&limiter);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await.commit();
                order.lock().unwrap().push(i);
            }));
            // let task i reach the queue before task i + 1 is spawned
            tokio::task::yield_now().await;
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
