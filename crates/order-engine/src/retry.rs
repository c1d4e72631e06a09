//! Bounded retry of atomic store calls.

use std::future::Future;
use std::time::Duration;

use ledger_store::StoreError;

/// Re-runs an atomic store call while it fails with a transient error.
///
/// Each store call is a complete transaction that was rolled back on failure,
/// so running it again is safe. The wait before attempt `n + 1` is
/// `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. At least one attempt is always made.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(operation, attempt, error = %err, "transient store failure, retrying");
                    metrics::counter!("ledger_transaction_retries_total", "operation" => operation)
                        .increment(1);
                    tokio::time::sleep(self.base_delay * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
