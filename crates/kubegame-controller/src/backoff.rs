//! Per-object exponential retry delays.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use kubegame_core::{ObjectKey, OperatorConfig};

/// Tracks consecutive failures per object and turns them into a requeue
/// delay: `base * 2^(failures - 1)`, capped at `max`.
#[derive(Debug)]
pub struct RetryBackoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl RetryBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &OperatorConfig) -> Self {
        Self::new(config.retry_base(), config.retry_max())
    }

    /// Record a failure for `key` and return how long to wait before retrying.
    pub fn next_delay(&self, key: &ObjectKey) -> Duration {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);

        let exponent = (*count - 1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Forget the failure history of `key` after a successful reconciliation.
    pub fn reset(&self, key: &ObjectKey) {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
    }

    /// Consecutive failures currently recorded for `key`.
    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> RetryBackoff {
        RetryBackoff::new(Duration::from_secs(5), Duration::from_secs(60))
    }

    #[test]
    fn delay_doubles_up_to_the_cap() {
        let backoff = backoff();
        let key = ObjectKey::new("default", "g1");

        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay(&key).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60]);
        assert_eq!(backoff.failures(&key), 6);
    }

    #[test]
    fn success_resets_history() {
        let backoff = backoff();
        let key = ObjectKey::new("default", "g1");
        backoff.next_delay(&key);
        backoff.next_delay(&key);

        backoff.reset(&key);
        assert_eq!(backoff.failures(&key), 0);
        assert_eq!(backoff.next_delay(&key), Duration::from_secs(5));
    }

    #[test]
    fn objects_back_off_independently() {
        let backoff = backoff();
        let g1 = ObjectKey::new("default", "g1");
        let g2 = ObjectKey::new("default", "g2");
        backoff.next_delay(&g1);
        backoff.next_delay(&g1);

        assert_eq!(backoff.next_delay(&g2), Duration::from_secs(5));
    }

    #[test]
    fn many_failures_do_not_overflow() {
        let backoff = backoff();
        let key = ObjectKey::new("default", "g1");
        for _ in 0..100 {
            assert!(backoff.next_delay(&key) <= Duration::from_secs(60));
        }
    }

    #[test]
    fn defaults_come_from_config() {
        let backoff = RetryBackoff::from_config(&OperatorConfig::default());
        let key = ObjectKey::new("default", "w1");
        assert_eq!(backoff.next_delay(&key), Duration::from_secs(5));
    }
}
