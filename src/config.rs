//! User settings (`~/.config/stagehand/config.toml`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

const CONFIG_FILE: &str = "config.toml";
const STATE_FILE: &str = "state.json";

/// Defaults for every run; command-line flags override them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where system values and check times are kept
    pub state_file: Option<String>,
    /// Never apply changes, only report them
    pub noop: bool,
    /// Evaluate resources regardless of their schedule
    pub ignore_schedules: bool,
    /// Only evaluate resources carrying one of these tags
    pub tags: Vec<String>,
}

impl Settings {
    /// Load settings from the config directory; a missing file means defaults
    pub fn load() -> Result<Self> {
        let path = paths::config_dir()?.join(CONFIG_FILE);
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Settings file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Resolved path of the state file
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(file) => Ok(paths::expand(file)),
            None => Ok(paths::state_dir()?.join(STATE_FILE)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
