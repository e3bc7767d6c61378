//! Token bucket admission control.

use parking_lot::Mutex;
use std::time::Instant;

/// Token bucket refilled continuously at `rate` tokens per second up to
/// `capacity`. Acquisition never blocks.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// A burst of zero is raised to one so the bucket can ever admit.
    #[must_use]
    pub fn new(rate: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            rate: rate.max(0.0),
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Refill rate in tokens per second
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Bucket capacity
    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Take one token if available
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Take one token, refilling up to `now` first
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = elapsed.mul_add(self.rate, state.tokens).min(self.capacity);
            state.last_refill = now;
        }

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, without refilling
    #[must_use]
    pub fn available(&self) -> f64 {
        self.state.lock().tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_then_deny() {
        let bucket = TokenBucket::new(1.0, 1);
        let t0 = Instant::now();
        assert!(bucket.try_acquire_at(t0));
        assert!(!bucket.try_acquire_at(t0));
        assert!(bucket.try_acquire_at(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let bucket = TokenBucket::new(10.0, 3);
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(bucket.try_acquire_at(t0));
        }
        let later = t0 + Duration::from_secs(60);
        for _ in 0..3 {
            assert!(bucket.try_acquire_at(later));
        }
        assert!(!bucket.try_acquire_at(later));
    }

    #[test]
    fn test_zero_burst_admits_one() {
        let bucket = TokenBucket::new(1.0, 0);
        assert!((bucket.capacity() - 1.0).abs() < f64::EPSILON);
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_clock_going_backwards_does_not_refill() {
        let bucket = TokenBucket::new(100.0, 1);
        let t1 = Instant::now() + Duration::from_secs(5);
        assert!(bucket.try_acquire_at(t1));
        assert!(!bucket.try_acquire_at(t1 - Duration::from_secs(1)));
    }
}
