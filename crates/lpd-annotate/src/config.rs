//! Engine timing configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry budget and coalescing windows of the annotation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay before retrying an identifier with no target yet.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Failed resolution attempts before an identifier is dropped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Coalescing window for fact arrival and scroll-triggered scans.
    #[serde(default = "default_scan_debounce_ms")]
    pub scan_debounce_ms: u64,
    #[serde(default = "default_mutation_debounce_ms")]
    pub mutation_debounce_ms: u64,
    #[serde(default = "default_scroll_debounce_ms")]
    pub scroll_debounce_ms: u64,
    /// Minimum spacing between handled scroll events.
    #[serde(default = "default_scroll_throttle_ms")]
    pub scroll_throttle_ms: u64,
    /// Delay before new rows are registered with the intersection watcher.
    #[serde(default = "default_observe_delay_ms")]
    pub observe_delay_ms: u64,
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    10
}

fn default_scan_debounce_ms() -> u64 {
    300
}

fn default_mutation_debounce_ms() -> u64 {
    100
}

fn default_scroll_debounce_ms() -> u64 {
    300
}

fn default_scroll_throttle_ms() -> u64 {
    300
}

fn default_observe_delay_ms() -> u64 {
    1_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: default_max_attempts(),
            scan_debounce_ms: default_scan_debounce_ms(),
            mutation_debounce_ms: default_mutation_debounce_ms(),
            scroll_debounce_ms: default_scroll_debounce_ms(),
            scroll_throttle_ms: default_scroll_throttle_ms(),
            observe_delay_ms: default_observe_delay_ms(),
        }
    }
}

impl EngineConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn scan_debounce(&self) -> Duration {
        Duration::from_millis(self.scan_debounce_ms)
    }

    pub fn mutation_debounce(&self) -> Duration {
        Duration::from_millis(self.mutation_debounce_ms)
    }

    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    pub fn scroll_throttle(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }

    pub fn observe_delay(&self) -> Duration {
        Duration::from_millis(self.observe_delay_ms)
    }
}
