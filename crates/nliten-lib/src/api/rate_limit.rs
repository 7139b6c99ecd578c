//! Fixed-interval rate limiter for the Enlighten API.
//!
//! Plans are metered in hits per minute, so calls are simply spaced
//! `60 / hits_per_min` seconds apart. No bursts, no token bucket.

use std::time::{Duration, Instant};

use crate::shutdown::Shutdown;

/// Free "Watt" plan allowance.
pub const DEFAULT_HITS_PER_MIN: u32 = 10;

#[derive(Debug)]
pub struct RateLimiter {
    spacing: Duration,
    last_hit: Option<Instant>,
}

impl RateLimiter {
    /// `hits_per_min` of zero is treated as one.
    pub fn new(hits_per_min: u32) -> Self {
        Self {
            spacing: Duration::from_secs_f64(60.0 / hits_per_min.max(1) as f64),
            last_hit: None,
        }
    }

    /// Minimum gap between two calls.
    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// How long a call made at `now` has to wait.
    pub fn delay_before(&self, now: Instant) -> Duration {
        match self.last_hit {
            None => Duration::ZERO,
            Some(last) => self
                .spacing
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }

    /// Mark a call as issued at `now`.
    pub fn record(&mut self, now: Instant) {
        self.last_hit = Some(now);
    }

    /// Block until the next call is allowed, then record it.
    pub fn acquire(&mut self) {
        let wait = self.delay_before(Instant::now());
        if !wait.is_zero() {
            log::debug!("rate limit: sleeping {:.1}s", wait.as_secs_f64());
            std::thread::sleep(wait);
        }
        self.record(Instant::now());
    }

    /// Like [`acquire`](Self::acquire), but gives up when `shutdown` fires.
    ///
    /// Returns `false` without recording a call if shutdown was requested.
    pub fn acquire_or_cancel(&mut self, shutdown: &Shutdown) -> bool {
        let wait = self.delay_before(Instant::now());
        if !wait.is_zero() {
            log::debug!("rate limit: waiting {:.1}s", wait.as_secs_f64());
        }
        if shutdown.wait_timeout(wait) {
            return false;
        }
        self.record(Instant::now());
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_HITS_PER_MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spacing_is_six_seconds() {
        assert_eq!(RateLimiter::default().spacing(), Duration::from_secs(6));
    }

    #[test]
    fn spacing_from_hits_per_min() {
        assert_eq!(RateLimiter::new(60).spacing(), Duration::from_secs(1));
        assert_eq!(RateLimiter::new(1).spacing(), Duration::from_secs(60));
    }

    #[test]
    fn zero_hits_treated_as_one() {
        assert_eq!(RateLimiter::new(0).spacing(), Duration::from_secs(60));
    }

    #[test]
    fn first_call_never_waits() {
        let limiter = RateLimiter::new(10);
        assert_eq!(limiter.delay_before(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn immediate_second_call_waits_full_spacing() {
        let mut limiter = RateLimiter::new(10);
        let t0 = Instant::now();
        limiter.record(t0);
        assert_eq!(limiter.delay_before(t0), Duration::from_secs(6));
    }

    #[test]
    fn partial_elapsed_waits_remainder() {
        let mut limiter = RateLimiter::new(10);
        let t0 = Instant::now();
        limiter.record(t0);
        let later = t0 + Duration::from_secs(4);
        assert_eq!(limiter.delay_before(later), Duration::from_secs(2));
    }

    #[test]
    fn no_wait_after_spacing_elapsed() {
        let mut limiter = RateLimiter::new(10);
        let t0 = Instant::now();
        limiter.record(t0);
        assert_eq!(
            limiter.delay_before(t0 + Duration::from_secs(7)),
            Duration::ZERO
        );
    }

    #[test]
    fn delay_plus_elapsed_never_below_spacing() {
        let mut limiter = RateLimiter::new(7);
        let t0 = Instant::now();
        limiter.record(t0);
        for ms in [0u64, 1, 500, 3_000, 8_571, 8_572, 20_000] {
            let now = t0 + Duration::from_millis(ms);
            let issued = now + limiter.delay_before(now);
            assert!(issued.duration_since(t0) >= limiter.spacing(), "at +{ms}ms");
        }
    }

    #[test]
    fn acquire_spaces_consecutive_calls() {
        let mut limiter = RateLimiter::new(1200); // 50ms
        let start = Instant::now();
        limiter.acquire();
        limiter.acquire();
        limiter.acquire();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn acquire_or_cancel_spaces_calls() {
        let mut limiter = RateLimiter::new(1200);
        let shutdown = Shutdown::new();
        let start = Instant::now();
        assert!(limiter.acquire_or_cancel(&shutdown));
        assert!(limiter.acquire_or_cancel(&shutdown));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn triggered_shutdown_cuts_wait_short() {
        let mut limiter = RateLimiter::new(1); // 60s
        let shutdown = Shutdown::new();
        limiter.record(Instant::now());
        shutdown.trigger();
        let start = Instant::now();
        assert!(!limiter.acquire_or_cancel(&shutdown));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn shutdown_from_other_thread_ends_wait() {
        let mut limiter = RateLimiter::new(1);
        let shutdown = Shutdown::new();
        let handle = shutdown.clone();
        limiter.record(Instant::now());
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.trigger();
        });
        let start = Instant::now();
        assert!(!limiter.acquire_or_cancel(&shutdown));
        assert!(start.elapsed() < Duration::from_secs(5));
        t.join().unwrap();
    }
}
