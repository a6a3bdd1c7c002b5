//! Engine configuration
//!
//! Defaults suit an interactive search service. Every field can be
//! overridden from the environment (`QUARRY_*`) or loaded from JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    /// Result limit when no `count:` is given and the caller is batch
    pub batch_result_limit: usize,
    /// Result limit when no `count:` is given and the caller streams
    pub streaming_result_limit: usize,
    /// Cap on each operand of an AND query
    pub and_operand_limit: usize,
    pub repo_page_size: usize,
    /// Per-repository deadline for unindexed searches without a full deadline
    pub searcher_fetch_timeout_ms: u64,
    pub searcher_concurrency: usize,
    /// How long optional jobs may run after the required jobs finish
    pub optional_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 20_000,
            max_timeout_ms: 60_000,
            batch_result_limit: 30,
            streaming_result_limit: 500,
            and_operand_limit: 40_000,
            repo_page_size: 500,
            searcher_fetch_timeout_ms: 2_000,
            searcher_concurrency: 16,
            optional_grace_ms: 500,
        }
    }
}

fn env_override<T: std::str::FromStr>(var: &'static str, slot: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(var) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value })?;
    }
    Ok(())
}

impl EngineConfig {
    /// Defaults overridden by `QUARRY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut c = Self::default();
        env_override("QUARRY_DEFAULT_TIMEOUT_MS", &mut c.default_timeout_ms)?;
        env_override("QUARRY_MAX_TIMEOUT_MS", &mut c.max_timeout_ms)?;
        env_override("QUARRY_BATCH_RESULT_LIMIT", &mut c.batch_result_limit)?;
        env_override("QUARRY_STREAMING_RESULT_LIMIT", &mut c.streaming_result_limit)?;
        env_override("QUARRY_AND_OPERAND_LIMIT", &mut c.and_operand_limit)?;
        env_override("QUARRY_REPO_PAGE_SIZE", &mut c.repo_page_size)?;
        env_override("QUARRY_SEARCHER_FETCH_TIMEOUT_MS", &mut c.searcher_fetch_timeout_ms)?;
        env_override("QUARRY_SEARCHER_CONCURRENCY", &mut c.searcher_concurrency)?;
        env_override("QUARRY_OPTIONAL_GRACE_MS", &mut c.optional_grace_ms)?;
        c.validate()?;
        Ok(c)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let c: Self = serde_json::from_str(&raw)?;
        c.validate()?;
        Ok(c)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_timeout_ms == 0 {
            return Err(ConfigError::Invalid("max_timeout_ms must be positive".into()));
        }
        if self.default_timeout_ms > self.max_timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "default_timeout_ms ({}) exceeds max_timeout_ms ({})",
                self.default_timeout_ms, self.max_timeout_ms
            )));
        }
        if self.batch_result_limit == 0 || self.streaming_result_limit == 0 {
            return Err(ConfigError::Invalid("result limits must be positive".into()));
        }
        if self.repo_page_size == 0 {
            return Err(ConfigError::Invalid("repo_page_size must be positive".into()));
        }
        if self.searcher_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "searcher_concurrency must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    pub fn searcher_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.searcher_fetch_timeout_ms)
    }

    pub fn optional_grace(&self) -> Duration {
        Duration::from_millis(self.optional_grace_ms)
    }
}
