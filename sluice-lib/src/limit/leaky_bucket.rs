//! Leaky bucket: water drains at `limit / window` per second, each
//! admission pours in one unit, and a full bucket rejects.

use std::sync::Mutex;
use std::time::Duration;

use ahash::AHashMap;

use super::{evict_if_full, lock_state, Decision, RuleConfig};

#[derive(Debug)]
struct BucketState {
    water: f64,
    last_leak: Duration,
}

/// Rejections leave the stored state untouched: the water keeps draining
/// from the last admission, so repeated rejected attempts do not push the
/// retry hint further out. Contrast with the token bucket, which commits
/// its refill on every call.
#[derive(Debug)]
pub struct LeakyBucketLimiter {
    rate: f64,
    capacity: f64,
    max_keys: usize,
    buckets: Mutex<AHashMap<String, BucketState>>,
}

impl LeakyBucketLimiter {
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
            let elapsed = now.saturating_sub(bucket.last_leak).as_secs_f64();
            let current = (bucket.water - elapsed * self.rate).max(0.0);

            if current + 1.0 > self.capacity {
                let wait = (current + 1.0 - self.capacity) / self.rate;
                return Decision::limited(Duration::from_secs_f64(wait.max(0.0)));
            }

            bucket.water = current + 1.0;
            bucket.last_leak = now;
            return Decision::Allowed;
        }

        evict_if_full(&mut buckets, key, self.max_keys);
        buckets.insert(key.to_string(), BucketState { water: 1.0, last_leak: now });
        Decision::Allowed
    }

    pub fn close(&self) {
        lock_state(&self.buckets).clear();
    }
}
