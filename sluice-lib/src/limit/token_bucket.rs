//! Token bucket: tokens refill at `limit / window` per second up to
//! `limit`, and each admission spends one.

use std::sync::Mutex;
use std::time::Duration;

use ahash::AHashMap;

use super::{evict_if_full, lock_state, Decision, RuleConfig};

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Duration,
}

/// A fresh bucket starts full, minus the token the creating request
/// spends. Unlike the leaky bucket, the refill is committed even when the
/// request is rejected, so the retry hint is always relative to `now`.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    rate: f64,
    capacity: f64,
    max_keys: usize,
    buckets: Mutex<AHashMap<String, BucketState>>,
}

impl TokenBucketLimiter {
    pub(crate) fn new(config: RuleConfig, max_keys: usize) -> Self {
        Self {
            rate: config.rate(),
            capacity: config.capacity(),
            max_keys,
            buckets: Mutex::new(AHashMap::new()),
        }
    }

    pub fn allow(&self, key: &str, now: Duration) -> Decision {
        let mut buckets = lock_state(&self.buckets);

        if let Some(bucket) = buckets.get_mut(key) {
            let elapsed = now.saturating_sub(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
            bucket.last_refill = now;

            if bucket.tokens < 1.0 {
                let wait = (1.0 - bucket.tokens) / self.rate;
                return Decision::limited(Duration::from_secs_f64(wait.max(0.0)));
            }

            bucket.tokens -= 1.0;
            return Decision::Allowed;
        }

        // A fresh bucket is full; this request spends one token.
        evict_if_full(&mut buckets, key, self.max_keys);
        buckets.insert(
            key.to_string(),
            BucketState { tokens: self.capacity - 1.0, last_refill: now },
        );
        Decision::Allowed
    }

    pub fn close(&self) {
        lock_state(&self.buckets).clear();
    }
}
