//! Rate limiting for log spam suppression.
//!
//! A failing allocation inside a 120 Hz frame loop would otherwise emit
//! the same error line thousands of times per second.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Process-wide clock origin for the atomic timestamps.
static CLOCK_ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Never-emitted sentinel for the last-emission timestamp.
const NEVER: u64 = u64::MAX;

#[inline]
fn now_micros() -> u64 {
    CLOCK_ORIGIN
        .get_or_init(Instant::now)
        .elapsed()
        .as_micros() as u64
}

/// Lock-free emission limiter: at most one `allow` per window.
///
/// Concurrent callers race on a compare-exchange; exactly one wins the
/// emission slot for the window, the rest are suppressed.
pub struct RateLimiter {
    window_micros: u64,
    last_emit: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter allowing one emission per `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window_micros: window.as_micros() as u64,
            last_emit: AtomicU64::new(NEVER),
        }
    }

    /// Check whether the caller may emit now.
    pub fn allow(&self) -> bool {
        let now = now_micros();
        let last = self.last_emit.load(Ordering::Relaxed);

        if last != NEVER && now.saturating_sub(last) < self.window_micros {
            return false;
        }

        self.last_emit
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_emission_allowed() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        assert!(limiter.allow());
    }

    #[test]
    fn test_suppression_within_window() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        assert!(limiter.allow());
        for _ in 0..100 {
            assert!(!limiter.allow());
        }
    }

    #[test]
    fn test_emission_after_window() {
        let limiter = RateLimiter::new(Duration::from_millis(5));
        assert!(limiter.allow());
        assert!(!limiter.allow());

        std::thread::sleep(Duration::from_millis(10));
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn test_concurrent_single_winner() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(std::thread::spawn(move || limiter.allow() as usize));
        }

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 1);
    }
}
