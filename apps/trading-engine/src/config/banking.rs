//! Banking service configuration.

use serde::{Deserialize, Serialize};

/// Banking service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankingConfig {
    /// Base URL of the banking service.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// HS256 secret shared with the banking service.
    #[serde(default)]
    pub token_secret: String,
    /// Settlement token lifetime (seconds).
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Request timeout (seconds). Unset means wait indefinitely.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for BankingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_secret: String::new(),
            token_ttl_secs: default_token_ttl_secs(),
            request_timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8082".to_string()
}

const fn default_token_ttl_secs() -> u64 {
    300
}
