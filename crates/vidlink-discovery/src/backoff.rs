//! Exponential retry interval for failed discovery.

use std::time::Duration;

use vidlink_core::BridgeConfig;

/// Doubles on every failure up to `max_ms`, snaps back to `base_ms` on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    current_ms: u64,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        let base_ms = base_ms.max(1);
        let max_ms = max_ms.max(base_ms);
        Self {
            base_ms,
            max_ms,
            current_ms: base_ms,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.backoff_base_ms, config.backoff_max_ms)
    }

    /// Record a failure and return the new interval in milliseconds.
    pub fn on_failure(&mut self) -> u64 {
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
        self.current_ms
    }

    pub fn on_success(&mut self) {
        self.current_ms = self.base_ms;
    }

    pub fn interval_ms(&self) -> u64 {
        self.current_ms
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }

    pub fn is_at_base(&self) -> bool {
        self.current_ms == self.base_ms
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(1000, 60_000)
    }
}
