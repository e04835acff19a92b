//! Settlement saga configuration.

use serde::{Deserialize, Serialize};

use crate::retry::FixedBackoff;

/// Settlement saga configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaConfig {
    /// Pause between attempts of notifications, rollbacks and ACK handling (milliseconds).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl SagaConfig {
    /// Backoff used by the unbounded retry loops.
    #[must_use]
    pub const fn backoff(&self) -> FixedBackoff {
        FixedBackoff::from_millis(self.retry_backoff_ms)
    }
}

const fn default_retry_backoff_ms() -> u64 {
    3_000
}
