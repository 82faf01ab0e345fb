//! # Wait Configuration
//!
//! Default polling cadence for waits, loaded from TOML and optionally
//! overridden from the environment.
//!
//! ```toml
//! poll_interval_ms = 50
//! timeout_ms = 5000
//! policy = "backoff"
//! backoff_factor = 2.0
//! max_interval_ms = 500
//! ```
//!
//! Millisecond values are signed so that zero or negative entries reach
//! validation and come back as `InvalidArgument` instead of a parse error.
//!
//! ## Environment Overrides
//!
//! - `SETTLE_POLL_INTERVAL_MS`
//! - `SETTLE_TIMEOUT_MS`

use crate::error::WaitError;
use crate::request::{PollPolicy, WaitSettings, positive_millis};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const POLL_INTERVAL_ENV: &str = "SETTLE_POLL_INTERVAL_MS";
pub const TIMEOUT_ENV: &str = "SETTLE_TIMEOUT_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Fixed,
    Backoff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitConfig {
    pub poll_interval_ms: i64,
    pub timeout_ms: i64,
    pub policy: PolicyKind,
    /// Only used with the backoff policy
    pub backoff_factor: f64,
    /// Only used with the backoff policy
    pub max_interval_ms: i64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            timeout_ms: 5_000,
            policy: PolicyKind::Fixed,
            backoff_factor: 2.0,
            max_interval_ms: 500,
        }
    }
}

impl WaitConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse wait configuration")
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Apply `SETTLE_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Unset keys leave values unchanged.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(POLL_INTERVAL_ENV) {
            self.poll_interval_ms = parse_millis(POLL_INTERVAL_ENV, &value)?;
        }
        if let Some(value) = lookup(TIMEOUT_ENV) {
            self.timeout_ms = parse_millis(TIMEOUT_ENV, &value)?;
        }
        Ok(self)
    }

    /// Validate into [`WaitSettings`].
    pub fn settings(&self) -> Result<WaitSettings, WaitError> {
        let settings = WaitSettings::from_millis(self.poll_interval_ms, self.timeout_ms)?;
        match self.policy {
            PolicyKind::Fixed => Ok(settings),
            PolicyKind::Backoff => settings.with_policy(PollPolicy::Backoff {
                factor: self.backoff_factor,
                max_interval: positive_millis("max interval", self.max_interval_ms)?,
            }),
        }
    }
}

fn parse_millis(key: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be an integer number of milliseconds, got '{value}'"))
}
