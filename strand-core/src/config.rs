//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Environment variables override loaded values:
//!
//! | Variable                        | Field                            |
//! |---------------------------------|----------------------------------|
//! | `STRAND_POLL_INTERVAL_MS`       | `scheduler.poll_interval_ms`     |
//! | `STRAND_CATCH_PANICS`           | `scheduler.catch_panics`         |
//! | `STRAND_DEFAULT_INPUT_CAPACITY` | `graph.default_input_capacity`   |

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Scheduler loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long an idle loop blocks before re-checking exit and interrupts.
    pub poll_interval_ms: u64,
    /// Convert panics inside tasks into fatal task failures.
    pub catch_panics: bool,
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            catch_panics: true,
        }
    }
}

/// Graph protocol settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Capacity for input ports that do not declare one. `None` is unbounded.
    pub default_input_capacity: Option<usize>,
    /// Capacity for output ports that do not declare one. `None` is unbounded.
    pub default_output_capacity: Option<usize>,
    /// Label edges with the shape of pushed data when no label is given.
    pub derive_labels: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_input_capacity: Some(1),
            default_output_capacity: None,
            derive_labels: true,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub scheduler: SchedulerConfig,
    pub graph: GraphConfig,
}

impl RuntimeConfig {
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from a variable lookup.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup("STRAND_POLL_INTERVAL_MS") {
            self.scheduler.poll_interval_ms = parse("STRAND_POLL_INTERVAL_MS", value)?;
        }
        if let Some(value) = lookup("STRAND_CATCH_PANICS") {
            self.scheduler.catch_panics = match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "STRAND_CATCH_PANICS",
                        value,
                    })
                }
            };
        }
        if let Some(value) = lookup("STRAND_DEFAULT_INPUT_CAPACITY") {
            self.graph.default_input_capacity = match value.to_lowercase().as_str() {
                "unbounded" | "none" => None,
                _ => Some(parse("STRAND_DEFAULT_INPUT_CAPACITY", value)?),
            };
        }
        Ok(self)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}
