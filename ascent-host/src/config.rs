//! Host configuration: the engine's `AscentConfig` plus a `[host]` table.
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [[stats]]
//! id = "strength"
//! base = 10.0
//!
//! [host]
//! save_path = "saves/progress.db"
//! queue_capacity = 512
//! json_logs = true
//! ```

use std::path::{Path, PathBuf};

use ascent_core::config::AscentConfig;
use ascent_core::error::{AscentError, Result};
use serde::{Deserialize, Serialize};

/// Everything a host process reads at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Engine content and tuning.
    #[serde(flatten)]
    pub ascent: AscentConfig,
    /// Host loop settings.
    #[serde(default)]
    pub host: HostSettings,
}

impl HostConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    /// Returns `AscentError::Config` for parse failures or any engine
    /// validation error.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| AscentError::Config(e.to_string()))?;
        config.ascent.validate()?;
        config.host.validate()?;
        Ok(config)
    }

    /// Load from a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }
}

/// The `[host]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    /// SQLite save file. No persistence when absent.
    #[serde(default)]
    pub save_path: Option<PathBuf>,
    /// Save automatically every `persistence.auto_save_interval_seconds`.
    #[serde(default = "default_true")]
    pub autosave: bool,
    /// Maximum queued events; producers are refused beyond this.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Events routed per step; the rest wait for the next step.
    #[serde(default = "default_max_events_per_step")]
    pub max_events_per_step: usize,
    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json_logs: bool,
}

impl HostSettings {
    fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(AscentError::Config("host.queue_capacity must be at least 1".to_string()));
        }
        if self.max_events_per_step == 0 {
            return Err(AscentError::Config(
                "host.max_events_per_step must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            save_path: None,
            autosave: true,
            queue_capacity: default_queue_capacity(),
            max_events_per_step: default_max_events_per_step(),
            json_logs: false,
        }
    }
}

fn default_true() -> bool { true }
fn default_queue_capacity() -> usize { 1024 }
fn default_max_events_per_step() -> usize { 256 }
