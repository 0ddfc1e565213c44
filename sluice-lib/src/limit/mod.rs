//! Rate-limiting engine for the gateway.
//!
//! The engine answers one question on every proxied request: may this key
//! pass through this path right now, and if not, how long should it wait?
//! Four algorithms implement that contract with different state shapes:
//!
//! 1. **Sliding log** (`sliding_log.rs`): per-key timestamp log, exact
//!    over the trailing window, O(limit) memory per active key.
//!
//! 2. **Window counter** (`sliding_window.rs`): per-key tumbling window
//!    counter. Kept under the `sliding_window` wire name for
//!    compatibility even though it does not interpolate across window
//!    boundaries.
//!
//! 3. **Leaky bucket** (`leaky_bucket.rs`): per-key water level draining
//!    at `limit / window` per second.
//!
//! 4. **Token bucket** (`token_bucket.rs`): per-key token count refilling
//!    at `limit / window` per second, bursting up to `limit`.
//!
//! The algorithm set is closed, so [`Limiter`] is a plain enum rather
//! than a trait object: state shapes live inline and the hot path
//! dispatches with a `match`. [`RuleRegistry`] maps exact request paths
//! to installed rules and fails open for paths it does not know.
//!
//! All timestamps are durations since one [`Clock`](crate::clock::Clock)
//! origin; the engine itself never reads wall time.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod leaky_bucket;
mod limiter;
mod registry;
mod sliding_log;
mod sliding_window;
mod token_bucket;

pub use leaky_bucket::LeakyBucketLimiter;
pub use limiter::Limiter;
pub use registry::{Rule, RuleRegistry};
pub use sliding_log::SlidingLogLimiter;
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

/// Default cap on distinct keys tracked per rule.
pub const DEFAULT_MAX_KEYS_PER_RULE: usize = 100_000;

/// The admission algorithm installed against a path.
///
/// Wire names are fixed: `sliding_log`, `sliding_window`, `leaky_bucket`,
/// `token_bucket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    SlidingLog,
    SlidingWindow,
    LeakyBucket,
    TokenBucket,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::SlidingLog => "sliding_log",
            Algorithm::SlidingWindow => "sliding_window",
            Algorithm::LeakyBucket => "leaky_bucket",
            Algorithm::TokenBucket => "token_bucket",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = LimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sliding_log" => Ok(Algorithm::SlidingLog),
            "sliding_window" => Ok(Algorithm::SlidingWindow),
            "leaky_bucket" => Ok(Algorithm::LeakyBucket),
            "token_bucket" => Ok(Algorithm::TokenBucket),
            other => Err(LimitError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Admission budget for one rule: `limit` admissions per `window_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleConfig {
    pub window_size: Duration,
    pub limit: u64,
}

impl RuleConfig {
    /// Reject non-positive windows and limits.
    pub fn validate(&self) -> Result<(), LimitError> {
        if self.window_size.is_zero() {
            return Err(LimitError::InvalidConfig("window_size must be positive".to_string()));
        }
        if self.limit == 0 {
            return Err(LimitError::InvalidConfig("limit must be positive".to_string()));
        }
        Ok(())
    }

    /// Drain/refill rate in events per second.
    pub fn rate(&self) -> f64 {
        self.limit as f64 / self.window_size.as_secs_f64()
    }

    /// Burst capacity, equal to the configured limit.
    pub fn capacity(&self) -> f64 {
        self.limit as f64
    }
}

/// Outcome of one admission check.
///
/// `retry_after` is a lower bound on the wait before the next attempt can
/// succeed. It is zero exactly when the request is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited { retry_after: Duration },
}

impl Decision {
    pub(crate) fn limited(retry_after: Duration) -> Self {
        Decision::Limited { retry_after }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn retry_after(&self) -> Duration {
        match self {
            Decision::Allowed => Duration::ZERO,
            Decision::Limited { retry_after } => *retry_after,
        }
    }
}

/// Errors from installing or building rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitError {
    #[error("invalid rule config: {0}")]
    InvalidConfig(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Lock a per-rule state mutex, recovering from poisoning.
///
/// Admission decisions are straight-line arithmetic and do not unwind
/// while the guard is held, so a poisoned mutex still guards coherent
/// state.
pub(crate) fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Enforce the per-rule key cap before inserting `key`.
///
/// When the map is full and `key` is new, one arbitrary entry is dropped
/// (AHashMap iteration order, effectively random). Keeps the hot path
/// O(1) instead of tracking recency.
pub(crate) fn evict_if_full<V>(map: &mut AHashMap<String, V>, key: &str, max_keys: usize) {
    if max_keys == 0 || map.len() < max_keys || map.contains_key(key) {
        return;
    }
    if let Some(victim) = map.keys().next().cloned() {
        map.remove(&victim);
    }
}
