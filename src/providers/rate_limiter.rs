//! Token-bucket rate limiting for RPC providers
//!
//! Each provider gets a bucket sized for its sustained rate with a
//! two-second burst allowance. Refill is lazy, so checks stay cheap
//! enough for the selection hot path.

use std::time::{Duration, Instant};

/// Rate limiter using the token bucket algorithm
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens the bucket can hold
    capacity: f64,

    /// Current token count
    tokens: f64,

    /// Token refill rate (tokens per second)
    refill_rate: f64,

    /// Last refill timestamp
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket refilling at `calls_per_second`, holding up to two
    /// seconds of headroom for bursts
    pub fn new(calls_per_second: f64) -> Self {
        let capacity = calls_per_second * 2.0;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: calls_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Try to consume a token (non-blocking)
    pub fn try_consume(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until a full token will be available
    pub fn time_until_next_token(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }

    /// Debit one token unconditionally, saturating at zero. Used after the
    /// selector has already slept through the refill interval.
    pub fn consume_now(&mut self) {
        self.refill();
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    /// Get current token count
    pub fn available_tokens(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}
