//! Engine configuration.
//!
//! Resolved once when the engine is opened and passed into the workflow.
//! Nothing in the request path reads the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SeverityLevel;
use crate::safety::ClassifierPolicy;

/// Minimum trimmed length of an override reason.
pub const DEFAULT_MIN_OVERRIDE_REASON_LEN: usize = 10;

/// Default lock wait for a writer, in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Safety engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SafetyConfig {
    /// Non-contraindicated alerts at or above this level require an override
    pub blocking_threshold: SeverityLevel,
    pub min_override_reason_len: usize,
    /// How long a prescribe call waits for another writer before failing
    pub busy_timeout_ms: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            blocking_threshold: SeverityLevel::Major,
            min_override_reason_len: DEFAULT_MIN_OVERRIDE_REASON_LEN,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl SafetyConfig {
    /// Parse and validate a JSON document. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: SafetyConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_override_reason_len == 0 {
            return Err(ConfigError::Invalid(
                "min_override_reason_len must be at least 1".into(),
            ));
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "busy_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn classifier_policy(&self) -> ClassifierPolicy {
        ClassifierPolicy {
            blocking_threshold: self.blocking_threshold,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
