//! Executor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use resumable_core::{CoreError, CoreResult};

use crate::backoff::{BackoffPolicy, DEFAULT_BASE_UNIT};

pub const ENV_EXECUTOR_NAME: &str = "RESUMABLE_EXECUTOR_NAME";
pub const ENV_BACKOFF_BASE_SECS: &str = "RESUMABLE_BACKOFF_BASE_SECS";
pub const ENV_BACKOFF_MAX_SECS: &str = "RESUMABLE_BACKOFF_MAX_SECS";

/// Resumable executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Name for logging
    pub name: String,
    /// Backoff delay for attempt 0, in seconds
    pub backoff_base_secs: u64,
    /// Optional cap on the backoff delay, in seconds
    pub backoff_max_secs: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: "resumable-executor".to_string(),
            backoff_base_secs: DEFAULT_BASE_UNIT.as_secs(),
            backoff_max_secs: None,
        }
    }
}

impl ExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_backoff_base_secs(mut self, secs: u64) -> Self {
        self.backoff_base_secs = secs;
        self
    }

    pub fn with_backoff_max_secs(mut self, secs: u64) -> Self {
        self.backoff_max_secs = Some(secs);
        self
    }

    /// Validated backoff policy for this configuration.
    pub fn backoff_policy(&self) -> CoreResult<BackoffPolicy> {
        let policy = BackoffPolicy::new(Duration::from_secs(self.backoff_base_secs))?;
        match self.backoff_max_secs {
            Some(max) => policy.with_max_delay(Duration::from_secs(max)),
            None => Ok(policy),
        }
    }

    /// Load from the process environment, falling back to defaults (with a
    /// warning) when a variable is present but invalid.
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|e| {
            warn!(error = %e, "invalid executor configuration in environment; using defaults");
            Self::default()
        })
    }

    /// Load from the process environment, rejecting invalid values.
    pub fn try_from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CoreResult<Self> {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_EXECUTOR_NAME) {
            let name = name.trim();
            if name.is_empty() {
                return Err(CoreError::invalid_argument(format!(
                    "{ENV_EXECUTOR_NAME} must not be empty"
                )));
            }
            config.name = name.to_string();
        }
        if let Some(raw) = lookup(ENV_BACKOFF_BASE_SECS) {
            config.backoff_base_secs = parse_secs(ENV_BACKOFF_BASE_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BACKOFF_MAX_SECS) {
            config.backoff_max_secs = Some(parse_secs(ENV_BACKOFF_MAX_SECS, &raw)?);
        }

        config.backoff_policy()?;
        Ok(config)
    }
}

fn parse_secs(key: &str, raw: &str) -> CoreResult<u64> {
    raw.trim()
        .parse()
        .map_err(|e| CoreError::invalid_argument(format!("{key}={raw:?}: {e}")))
}
