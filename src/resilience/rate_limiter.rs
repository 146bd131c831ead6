use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token-bucket rate limiter for one upstream source
///
/// The bucket refills continuously at `permits_per_minute / 60` tokens per
/// second and is capped at `permits_per_minute`. `try_acquire` is fail-fast:
/// a saturated bucket reports `false` immediately so the caller can record a
/// rate-limited result instead of stalling the aggregation deadline.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a full bucket sized for the given per-minute budget
    pub fn new(permits_per_minute: u32) -> Self {
        let capacity = f64::from(permits_per_minute.max(1));
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token if available; returns false without waiting otherwise
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, for diagnostics
    pub async fn available(&self) -> f64 {
        let state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        (state.tokens + elapsed * self.refill_per_sec).min(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_starts_full() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_fail_fast_returns_immediately() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire().await);

        let before = Instant::now();
        assert!(!limiter.try_acquire().await);
        assert!(before.elapsed().as_millis() < 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_refill() {
        let limiter = RateLimiter::new(60);
        for _ in 0..60 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);

        // One token per second at 60/minute
        tokio::time::advance(std::time::Duration::from_secs(2)).await;
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_caps_at_bucket_size() {
        let limiter = RateLimiter::new(10);
        tokio::time::advance(std::time::Duration::from_secs(600)).await;
        assert!(limiter.available().await <= 10.0);
    }
}
