//! Path-keyed registry of installed rate-limit rules.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use ahash::AHashMap;
use tracing::warn;

use super::{Algorithm, Decision, LimitError, Limiter, RuleConfig, DEFAULT_MAX_KEYS_PER_RULE};

/// A rule installed against one exact path.
#[derive(Debug)]
pub struct Rule {
    pub algorithm: Algorithm,
    pub config: RuleConfig,
    limiter: Limiter,
}

/// Registry mapping exact request paths to rules.
///
/// The admission path takes the read lock only long enough to clone the
/// rule's `Arc`; state mutation is serialized inside the rule's limiter.
/// Administrative operations take the write lock.
#[derive(Debug)]
pub struct RuleRegistry {
    rules: RwLock<AHashMap<String, Arc<Rule>>>,
    max_keys_per_rule: usize,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEYS_PER_RULE)
    }
}

impl RuleRegistry {
    /// Create an empty registry. `max_keys_per_rule` caps the number of
    /// distinct keys each rule tracks (0 means uncapped).
    pub fn new(max_keys_per_rule: usize) -> Self {
        Self { rules: RwLock::new(AHashMap::new()), max_keys_per_rule }
    }

    /// Install or replace the rule for `path`.
    ///
    /// Replacing closes the previous rule's per-key state before the new
    /// rule becomes visible; both happen under the write lock.
    pub fn add_rule(
        &self,
        path: &str,
        algorithm: Algorithm,
        config: RuleConfig,
    ) -> Result<(), LimitError> {
        let limiter = Limiter::new(algorithm, config, self.max_keys_per_rule)?;
        let rule = Arc::new(Rule { algorithm, config, limiter });

        let mut rules = self.rules.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(old) = rules.remove(path) {
            old.limiter.close();
        }
        rules.insert(path.to_string(), rule);
        Ok(())
    }

    /// Remove the rule for `path`, releasing its state. No-op if absent.
    pub fn remove_rule(&self, path: &str) {
        let mut rules = self.rules.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(rule) = rules.remove(path) {
            rule.limiter.close();
        }
    }

    /// Look up the installed rule for `path`.
    pub fn get_rule(&self, path: &str) -> Option<(Algorithm, RuleConfig)> {
        let rules = self.rules.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        rules.get(path).map(|rule| (rule.algorithm, rule.config))
    }

    /// Decide admission for `key` on `path` at clock reading `now`.
    ///
    /// Paths without a rule are admitted with zero wait: unknown paths
    /// are deliberately not rate-limited.
    pub fn allow(&self, path: &str, key: &str, now: Duration) -> Decision {
        let rule = {
            let rules = match self.rules.read() {
                Ok(guard) => guard,
                Err(_) => {
                    warn!("rule registry lock poisoned, admitting request");
                    return Decision::Allowed;
                }
            };
            match rules.get(path) {
                Some(rule) => Arc::clone(rule),
                None => return Decision::Allowed,
            }
        };
        rule.limiter.allow(key, now)
    }

    /// Close every rule and leave the registry empty but usable.
    pub fn close(&self) {
        let mut rules = self.rules.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (_, rule) in rules.drain() {
            rule.limiter.close();
        }
    }

    /// Number of installed rules.
    pub fn rule_count(&self) -> usize {
        let rules = self.rules.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        rules.len()
    }
}
