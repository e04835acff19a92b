//! Recovery configuration for crash recovery on startup.

use serde::{Deserialize, Serialize};

use super::default_true;

/// Recovery configuration for crash recovery on startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Compensate sagas left over from a previous run.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Restart matching for approved orders that are not done.
    #[serde(default)]
    pub resume_matching: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resume_matching: false,
        }
    }
}
