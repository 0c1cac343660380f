//! Campaign configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes.

use std::path::PathBuf;
use std::time::Duration;

use lantern_synth::{SynthConfig, SynthConfigError};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid synthesis config: {0}")]
    Synth(#[from] SynthConfigError),
}

/// Bounds on the build-and-run step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts before giving up.
    pub budget: u32,
    /// Wall-clock cap across all attempts, in seconds.
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            budget: 3,
            timeout_secs: 120,
        }
    }
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanternConfig {
    /// Candidates generated per target.
    pub candidates: usize,
    /// Run seed; candidate `i` draws from `candidate_rng(seed, i)`.
    pub seed: u64,
    /// Cap on retained non-failing fragments per function.
    pub max_suite_size: usize,
    /// How long the selector drains events, in milliseconds.
    pub collect_window_ms: u64,
    /// Suffix applied to every renamed item of the instrumented copy.
    pub run_id: String,
    pub synth: SynthConfig,
    pub retry: RetryConfig,
    /// Where the compiled suite writes its handoff JSON.
    pub handoff_path: Option<PathBuf>,
}

impl Default for LanternConfig {
    fn default() -> Self {
        Self {
            candidates: 32,
            seed: 42,
            max_suite_size: 8,
            collect_window_ms: 3000,
            run_id: "1".to_string(),
            synth: SynthConfig::default(),
            retry: RetryConfig::default(),
            handoff_path: None,
        }
    }
}

impl LanternConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.synth.validate()?;
        Ok(config)
    }

    pub fn collect_window(&self) -> Duration {
        Duration::from_millis(self.collect_window_ms)
    }
}
