//! The tagged sum over the four admission algorithms.

use std::time::Duration;

use super::{
    Algorithm, Decision, LeakyBucketLimiter, LimitError, RuleConfig, SlidingLogLimiter,
    SlidingWindowLimiter, TokenBucketLimiter,
};

/// One installed limiter with its per-key state inline.
///
/// The variant set is closed, so dispatch is a `match` instead of a
/// vtable call on the hot path.
#[derive(Debug)]
pub enum Limiter {
    SlidingLog(SlidingLogLimiter),
    SlidingWindow(SlidingWindowLimiter),
    LeakyBucket(LeakyBucketLimiter),
    TokenBucket(TokenBucketLimiter),
}

impl Limiter {
    /// Build a limiter for `algorithm`, validating `config` first.
    pub fn new(
        algorithm: Algorithm,
        config: RuleConfig,
        max_keys: usize,
    ) -> Result<Self, LimitError> {
        config.validate()?;
        Ok(match algorithm {
            Algorithm::SlidingLog => Limiter::SlidingLog(SlidingLogLimiter::new(config, max_keys)),
            Algorithm::SlidingWindow => {
                Limiter::SlidingWindow(SlidingWindowLimiter::new(config, max_keys))
            }
            Algorithm::LeakyBucket => {
                Limiter::LeakyBucket(LeakyBucketLimiter::new(config, max_keys))
            }
            Algorithm::TokenBucket => {
                Limiter::TokenBucket(TokenBucketLimiter::new(config, max_keys))
            }
        })
    }

    /// Decide admission for `key` at clock reading `now`.
    ///
    /// Safe to call concurrently; per-key invariants hold across
    /// interleavings because each variant serializes on its state map.
    pub fn allow(&self, key: &str, now: Duration) -> Decision {
        match self {
            Limiter::SlidingLog(l) => l.allow(key, now),
            Limiter::SlidingWindow(l) => l.allow(key, now),
            Limiter::LeakyBucket(l) => l.allow(key, now),
            Limiter::TokenBucket(l) => l.allow(key, now),
        }
    }

    /// Release all per-key state. Idempotent; a later `allow` simply
    /// recreates state lazily.
    pub fn close(&self) {
        match self {
            Limiter::SlidingLog(l) => l.close(),
            Limiter::SlidingWindow(l) => l.close(),
            Limiter::LeakyBucket(l) => l.close(),
            Limiter::TokenBucket(l) => l.close(),
        }
    }
}
