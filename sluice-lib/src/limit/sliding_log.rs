//! Sliding log: exact admission counting over the trailing window.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use ahash::AHashMap;

use super::{evict_if_full, lock_state, Decision, RuleConfig};

/// Keeps one timestamp per admission and expires entries as the window
/// slides. Memory is O(limit) per active key: timestamps are only
/// appended while the log holds fewer than `limit` live entries.
#[derive(Debug)]
pub struct SlidingLogLimiter {
    window: Duration,
    limit: u64,
    max_keys: usize,
    logs: Mutex<AHashMap<String, VecDeque<Duration>>>,
}

impl SlidingLogLimiter {
    pub(crate) fn new(config: RuleConfig, max_keys: usize) -> Self {
        Self {
            window: config.window_size,
            limit: config.limit,
            max_keys,
            logs: Mutex::new(AHashMap::new()),
        }
    }

    pub fn allow(&self, key: &str, now: Duration) -> Decision {
        let mut logs = lock_state(&self.logs);
        evict_if_full(&mut logs, key, self.max_keys);
        let log = logs.entry(key.to_string()).or_default();

        // Nothing can have expired while the clock reading is still inside
        // the first window, hence checked_sub rather than a saturating one:
        // a cutoff clamped to zero would expire timestamps taken at zero.
        if let Some(window_start) = now.checked_sub(self.window) {
            while log.front().map_or(false, |ts| *ts <= window_start) {
                log.pop_front();
            }
        }

        if (log.len() as u64) < self.limit {
            log.push_back(now);
            return Decision::Allowed;
        }

        let oldest = log.front().copied().unwrap_or(now);
        Decision::limited((oldest + self.window).saturating_sub(now))
    }

    pub fn close(&self) {
        lock_state(&self.logs).clear();
    }
}
