//! State persistence configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// State persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable state persistence.
    #[serde(default = "default_persistence_enabled")]
    pub enabled: bool,
    /// JSON snapshot rewritten on every commit.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_persistence_enabled(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl PersistenceConfig {
    /// A store that lives only in memory.
    #[must_use]
    pub const fn volatile() -> Self {
        Self {
            enabled: false,
            snapshot_path: None,
        }
    }
}

const fn default_persistence_enabled() -> bool {
    true
}

fn default_snapshot_path() -> Option<PathBuf> {
    Some(PathBuf::from("./data/trading-engine.json"))
}
