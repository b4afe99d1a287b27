use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::Clock;
use crate::error::ApiError;
use crate::token_bucket::TokenBucket;

/// Outcome of a per-client check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientDecision {
    Allowed { remaining: u32 },
    Throttled { retry_after: Duration },
}

/// Per-client token buckets keyed by client identity.
///
/// One lock guards the whole map; a check holds it for the full
/// lookup-refill-consume sequence so two requests can never spend the same
/// token. Entries are never evicted.
#[derive(Clone)]
pub struct ClientRateLimiter {
    capacity: u32,
    refill_rate: f64,
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
    clock: Arc<dyn Clock>,
}

impl ClientRateLimiter {
    pub fn new(capacity: u32, refill_rate: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity,
            refill_rate,
            buckets: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, TokenBucket>>, ApiError> {
        self.buckets
            .lock()
            .map_err(|_| ApiError::InternalError("Failed to acquire lock on client buckets".to_string()))
    }

    /// Ensure a bucket exists for `identity`, returning its available tokens.
    pub fn get_or_create(&self, identity: &str) -> Result<u32, ApiError> {
        let mut buckets = self.lock()?;
        let now = self.clock.now();
        let bucket = buckets
            .entry(identity.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity, self.refill_rate, now));
        Ok(bucket.available_tokens(now))
    }

    /// Spend one token for `identity`, creating a full bucket on first contact.
    pub fn try_consume(&self, identity: &str) -> Result<ClientDecision, ApiError> {
        // clock is read under the lock so buckets see instants in order
        let mut buckets = self.lock()?;
        let now = self.clock.now();

        let bucket = buckets
            .entry(identity.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity, self.refill_rate, now));

        if bucket.try_consume(now) {
            Ok(ClientDecision::Allowed {
                remaining: bucket.available_tokens(now),
            })
        } else {
            let retry_after = bucket
                .time_until_available(now)
                .unwrap_or(Duration::ZERO);
            Ok(ClientDecision::Throttled { retry_after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn limiter(capacity: u32, rate: f64) -> (ClientRateLimiter, MockClock) {
        let clock = MockClock::default();
        (ClientRateLimiter::new(capacity, rate, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_new_client_starts_full() {
        let (limiter, _) = limiter(5, 5.0);
        assert_eq!(limiter.get_or_create("10.0.0.1").unwrap(), 5);
        assert_eq!(limiter.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_burst_beyond_capacity_is_throttled() {
        let (limiter, _) = limiter(5, 5.0);
        let decisions: Vec<_> = (0..6)
            .map(|_| limiter.try_consume("10.0.0.1").unwrap())
            .collect();

        assert!(decisions[..5]
            .iter()
            .all(|d| matches!(d, ClientDecision::Allowed { .. })));
        assert!(matches!(decisions[5], ClientDecision::Throttled { .. }));
    }

    #[test]
    fn test_refill_readmits_client() {
        let (limiter, clock) = limiter(2, 1.0);
        limiter.try_consume("a").unwrap();
        limiter.try_consume("a").unwrap();

        match limiter.try_consume("a").unwrap() {
            ClientDecision::Throttled { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(1))
            }
            other => panic!("expected throttling, got {other:?}"),
        }

        clock.advance(Duration::from_secs(2));
        assert_eq!(
            limiter.try_consume("a").unwrap(),
            ClientDecision::Allowed { remaining: 1 }
        );
    }

    #[test]
    fn test_clients_are_independent() {
        let (limiter, _) = limiter(1, 0.5);
        assert!(matches!(limiter.try_consume("a").unwrap(), ClientDecision::Allowed { .. }));
        assert!(matches!(limiter.try_consume("a").unwrap(), ClientDecision::Throttled { .. }));
        assert!(matches!(limiter.try_consume("b").unwrap(), ClientDecision::Allowed { .. }));
        assert_eq!(limiter.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_consumers_never_overspend() {
        let (limiter, _) = limiter(50, 0.0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| {
                            matches!(
                                limiter.try_consume("shared").unwrap(),
                                ClientDecision::Allowed { .. }
                            )
                        })
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
