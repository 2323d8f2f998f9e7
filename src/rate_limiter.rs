//! C1: weight-based token bucket gating every upstream call (spec §4.1).

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Fixed per-operation weights (spec §4.1).
pub const WEIGHT_FILLS: u32 = 20;
pub const WEIGHT_CLEARINGHOUSE: u32 = 2;
pub const WEIGHT_META: u32 = 1;

const MAX_POLL_DELAY_MS: u64 = 1_000;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with capacity `max_weight` over a rolling `window_ms`.
/// `acquire` blocks until the requested weight is available, then consumes
/// it atomically — it never partially consumes a request's weight.
pub struct RateLimiter {
    max_weight: f64,
    window_ms: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(max_weight: u32, window_ms: u64) -> Self {
        Self {
            max_weight: max_weight as f64,
            window_ms: window_ms as f64,
            bucket: Mutex::new(Bucket {
                tokens: max_weight as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Refills lazily by elapsed-time arithmetic, then tries to consume
    /// `weight` tokens. Returns `Some(())` on success, or `None` with the
    /// duration the caller should sleep before retrying.
    fn try_acquire_at(&self, weight: u32, now: Instant) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let refill_rate_per_ms = self.max_weight / self.window_ms;
        let refilled = bucket.tokens + elapsed.as_secs_f64() * 1000.0 * refill_rate_per_ms;
        bucket.tokens = refilled.min(self.max_weight);
        bucket.last_refill = now;

        let weight = weight as f64;
        if bucket.tokens >= weight {
            bucket.tokens -= weight;
            Ok(())
        } else {
            let deficit = weight - bucket.tokens;
            let wait_ms = (deficit / refill_rate_per_ms).max(1.0);
            Err(Duration::from_millis(wait_ms.min(MAX_POLL_DELAY_MS as f64) as u64))
        }
    }

    /// Blocks until at least `weight` tokens are available, then consumes
    /// them. Dropping this future (cancellation) before it resolves never
    /// consumes tokens — the only mutation happens on the successful path.
    pub async fn acquire(&self, weight: u32) {
        loop {
            match self.try_acquire_at(weight, Instant::now()) {
                Ok(()) => return,
                Err(wait) => sleep(wait.min(Duration::from_millis(MAX_POLL_DELAY_MS))).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_bucket_allows_weight_up_to_capacity() {
        let limiter = RateLimiter::new(100, 60_000);
        let now = Instant::now();
        assert!(limiter.try_acquire_at(100, now).is_ok());
        assert!(limiter.try_acquire_at(1, now).is_err());
    }

    #[test]
    fn refill_is_proportional_to_elapsed_time() {
        let limiter = RateLimiter::new(100, 60_000);
        let t0 = Instant::now();
        limiter.try_acquire_at(100, t0).unwrap();
        // Half the window later, half the capacity should have refilled.
        let t1 = t0 + Duration::from_millis(30_000);
        assert!(limiter.try_acquire_at(51, t1).is_err());
        assert!(limiter.try_acquire_at(49, t1).is_ok());
    }

    #[test]
    fn never_refills_past_capacity() {
        let limiter = RateLimiter::new(10, 1_000);
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(3600);
        assert!(limiter.try_acquire_at(10, t1).is_ok());
        assert!(limiter.try_acquire_at(1, t1).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_n_with_capacity_m_blocks_iff_n_exceeds_m() {
        let limiter = RateLimiter::new(5, 1_000);
        for _ in 0..5 {
            limiter.acquire(1).await;
        }
        // The bucket is now empty; a 6th unit-weight acquire must wait for
        // a refill rather than resolve immediately.
        let limiter = std::sync::Arc::new(limiter);
        let l2 = limiter.clone();
        let handle = tokio::spawn(async move { l2.acquire(1).await });
        tokio::time::advance(Duration::from_millis(5)).await;
        assert!(!handle.is_finished());
        tokio::time::advance(Duration::from_millis(1_000)).await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_does_not_consume_tokens() {
        let limiter = RateLimiter::new(1, 60_000);
        limiter.try_acquire_at(1, Instant::now()).unwrap();
        // Bucket is now empty. Start a waiter and drop it before it resolves.
        let fut = limiter.acquire(1);
        tokio::select! {
            _ = fut => panic!("should not resolve immediately"),
            _ = tokio::time::sleep(Duration::from_millis(1)) => {}
        }
        // The dropped waiter must not have left the bucket in debt.
        let bucket = limiter.bucket.lock();
        assert!(bucket.tokens >= 0.0);
    }
}
