//! Window counter limiter, served under the `sliding_window` wire name.
//!
//! Despite the name this is a fixed (tumbling) window: the counter resets
//! once the current window's duration has elapsed and admissions are not
//! interpolated across the boundary. The observable behavior is a step
//! function, and that step is part of the wire contract, so it must not
//! be smoothed. A weighted blend of adjacent windows would be a separate
//! algorithm.

use std::sync::Mutex;
use std::time::Duration;

use ahash::AHashMap;

use super::{evict_if_full, lock_state, Decision, RuleConfig};

#[derive(Debug)]
struct WindowState {
    started: Duration,
    count: u64,
}

#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    limit: u64,
    max_keys: usize,
    windows: Mutex<AHashMap<String, WindowState>>,
}

impl SlidingWindowLimiter {
    pub(crate) fn new(config: RuleConfig, max_keys: usize) -> Self {
        Self {
            window: config.window_size,
            limit: config.limit,
            max_keys,
            windows: Mutex::new(AHashMap::new()),
        }
    }

    pub fn allow(&self, key: &str, now: Duration) -> Decision {
        let mut windows = lock_state(&self.windows);

        if let Some(state) = windows.get_mut(key) {
            if now.saturating_sub(state.started) >= self.window {
                // Window elapsed: open a fresh one counting this request.
                state.started = now;
                state.count = 1;
                return Decision::Allowed;
            }
            if state.count >= self.limit {
                return Decision::limited((state.started + self.window).saturating_sub(now));
            }
            state.count += 1;
            return Decision::Allowed;
        }

        evict_if_full(&mut windows, key, self.max_keys);
        windows.insert(key.to_string(), WindowState { started: now, count: 1 });
        Decision::Allowed
    }

    pub fn close(&self) {
        lock_state(&self.windows).clear();
    }
}
