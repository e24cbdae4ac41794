//! Per-project settings from `.tabgroups/config.toml`.
//!
//! A missing file means defaults. Unknown keys are ignored.

use crate::core::error::TabGroupsError;
use crate::core::schemas;
use crate::core::store::Store;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

pub const DEFAULT_FALLBACK_BRANCH: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabGroupsConfig {
    /// Delay between branch polls.
    pub poll_interval_ms: u64,
    /// Delay before the first branch poll after start.
    pub poll_initial_delay_ms: u64,
    /// How long a create stays eligible for pairing with a delete.
    pub correlation_window_ms: u64,
    pub state_file: String,
    /// Branch name used when no detection strategy answers.
    pub fallback_branch: String,
    /// Path components the filesystem watcher drops events for.
    pub watch_ignore: Vec<String>,
}

impl Default for TabGroupsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            poll_initial_delay_ms: 1000,
            correlation_window_ms: 5000,
            state_file: schemas::DEFAULT_STATE_FILE.to_string(),
            fallback_branch: DEFAULT_FALLBACK_BRANCH.to_string(),
            watch_ignore: vec![
                ".git".to_string(),
                schemas::STATE_DIR_NAME.to_string(),
                "target".to_string(),
            ],
        }
    }
}

impl TabGroupsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_initial_delay(&self) -> Duration {
        Duration::from_millis(self.poll_initial_delay_ms)
    }

    pub fn correlation_window(&self) -> Duration {
        Duration::from_millis(self.correlation_window_ms)
    }

    pub fn from_toml(content: &str) -> Result<Self, TabGroupsError> {
        let config: TabGroupsConfig =
            toml::from_str(content).map_err(|e| TabGroupsError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TabGroupsError> {
        if self.poll_interval_ms == 0 {
            return Err(TabGroupsError::ConfigError(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.correlation_window_ms == 0 {
            return Err(TabGroupsError::ConfigError(
                "correlation_window_ms must be greater than zero".to_string(),
            ));
        }
        if self.state_file.trim().is_empty() || self.state_file.contains(['/', '\\']) {
            return Err(TabGroupsError::ConfigError(format!(
                "state_file must be a plain file name, got '{}'",
                self.state_file
            )));
        }
        if self.fallback_branch.trim().is_empty() {
            return Err(TabGroupsError::ConfigError(
                "fallback_branch must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load config for `store`, falling back to defaults when the file is absent.
pub fn load_config(store: &Store) -> Result<TabGroupsConfig, TabGroupsError> {
    let path = store.config_path();
    if !path.exists() {
        return Ok(TabGroupsConfig::default());
    }
    let content = fs::read_to_string(&path).map_err(TabGroupsError::IoError)?;
    TabGroupsConfig::from_toml(&content)
}
