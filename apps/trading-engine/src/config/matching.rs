//! Matching engine configuration.

use serde::{Deserialize, Serialize};

/// How many units one matching step fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepGranularity {
    /// One unit per step, settled individually.
    #[default]
    Unit,
    /// As much as the head counter-order allows.
    Batch,
}

/// Matching engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Units filled per step.
    #[serde(default)]
    pub granularity: StepGranularity,
    /// Lower bound of the randomized pause between steps (milliseconds).
    #[serde(default = "default_step_delay_min_ms")]
    pub step_delay_min_ms: u64,
    /// Upper bound of the randomized pause between steps (milliseconds).
    #[serde(default = "default_step_delay_max_ms")]
    pub step_delay_max_ms: u64,
    /// Extra pause for after-hours orders (seconds).
    #[serde(default = "default_after_hours_delay_secs")]
    pub after_hours_delay_secs: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            granularity: StepGranularity::default(),
            step_delay_min_ms: default_step_delay_min_ms(),
            step_delay_max_ms: default_step_delay_max_ms(),
            after_hours_delay_secs: default_after_hours_delay_secs(),
        }
    }
}

impl MatchingConfig {
    /// No pauses at all; what tests and benchmarks want.
    #[must_use]
    pub const fn immediate(granularity: StepGranularity) -> Self {
        Self {
            granularity,
            step_delay_min_ms: 0,
            step_delay_max_ms: 0,
            after_hours_delay_secs: 0,
        }
    }
}

const fn default_step_delay_min_ms() -> u64 {
    1_000
}

const fn default_step_delay_max_ms() -> u64 {
    10_000
}

const fn default_after_hours_delay_secs() -> u64 {
    1_800
}
