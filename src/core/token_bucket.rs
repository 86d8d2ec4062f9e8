//! Refillable token counter backing the rate limiter

use std::time::{Duration, Instant};

/// A single token bucket with lazy refill.
///
/// Not internally synchronized: the owning [`RateLimiter`] serializes all
/// access, and `refill` must be called before reading or mutating the level.
///
/// [`RateLimiter`]: crate::core::rate_limiter::RateLimiter
#[derive(Debug)]
pub struct TokenBucket {
    current: f64,
    capacity: f64,
    refresh_per_second: f64,
    last_update: Instant,
}

impl TokenBucket {
    /// Create a full bucket that regains `refresh_amount` tokens every
    /// `refresh_interval`, capped at `capacity`.
    pub fn new(capacity: f64, refresh_interval: Duration, refresh_amount: f64) -> Self {
        Self {
            current: capacity,
            capacity,
            refresh_per_second: refresh_amount / refresh_interval.as_secs_f64(),
            last_update: Instant::now(),
        }
    }

    /// Recompute the level from the time elapsed since the last refill.
    pub fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        self.current = (self.current + elapsed * self.refresh_per_second).min(self.capacity);
    }

    /// Whether `amount` tokens can be taken without going negative.
    pub fn can_consume(&self, amount: f64) -> bool {
        self.current - amount >= 0.0
    }

    /// Unconditionally deduct `amount`. The caller must have checked
    /// sufficiency first.
    pub fn consume(&mut self, amount: f64) {
        self.current -= amount;
    }

    pub fn level(&self) -> f64 {
        self.current
    }

    pub fn refresh_per_second(&self) -> f64 {
        self.refresh_per_second
    }
}
