//! Engine tuning knobs.

use std::time::Duration;

use domain::DEFAULT_LOW_STOCK_THRESHOLD;

use crate::retry::RetryPolicy;

/// Settings shared by the inventory and order services.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// How transient store conflicts are retried.
    pub retry: RetryPolicy,

    /// Stock level below which a product counts as low stock.
    pub low_stock_threshold: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }
}

impl EngineConfig {
    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.retry = RetryPolicy::new(max_attempts, base_delay);
        self
    }

    pub fn with_low_stock_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = threshold;
        self
    }
}
