use std::time::{Duration, Instant};

/// A single token bucket. Time is always supplied by the caller so the
/// bucket can be driven by any [`Clock`](crate::clock::Clock).
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u32,
    tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
}

impl TokenBucket {
    /// New buckets start full.
    pub fn new(capacity: u32, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate,
            last_refill: now,
        }
    }

    /// Refill, then take one token if one is available. A refused request
    /// consumes nothing.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn available_tokens(&mut self, now: Instant) -> u32 {
        self.refill(now);
        self.tokens.floor() as u32
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let tokens_to_add = self.refill_rate * elapsed.as_secs_f64();

        self.tokens = (self.tokens + tokens_to_add).min(self.capacity as f64);
        // last_refill only moves forward
        self.last_refill = self.last_refill.max(now);
    }

    /// How long until one more token accrues. `None` if one is available now.
    pub fn time_until_available(&mut self, now: Instant) -> Option<Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            return None;
        }

        if self.refill_rate <= 0.0 {
            return Some(Duration::MAX);
        }

        let tokens_needed = 1.0 - self.tokens;
        Some(Duration::from_secs_f64(tokens_needed / self.refill_rate))
    }
}
