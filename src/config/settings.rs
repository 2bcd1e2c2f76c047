//! Translator settings
//!
//! Settings are read from `~/.config/parley/settings.json` when present and
//! then overridden by environment variables. A missing API key is not an
//! error here; the translator reports it on first use so `connections`
//! subcommands work without one.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ParleyError, Result};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// WARNING: secret, never logged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub max_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl Settings {
    /// Load from the default location with environment overrides
    pub fn load() -> Result<Self> {
        let path = default_settings_path()?;
        let mut settings = Self::from_file(&path)?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load from a file; a missing file yields defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ParleyError::config(format!("Could not read settings file: {e}")))?;

        serde_json::from_str(&contents)
            .map_err(|e| ParleyError::config(format!("Invalid settings file format: {e}")))
    }

    /// Apply `ANTHROPIC_API_KEY`, `PARLEY_MODEL` and `PARLEY_API_URL`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("PARLEY_MODEL").filter(|m| !m.trim().is_empty()) {
            self.model = model;
        }
        if let Some(url) = lookup("PARLEY_API_URL").filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
    }
}

pub fn default_settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ParleyError::config("Could not determine user config directory"))?;
    Ok(config_dir.join("parley").join("settings.json"))
}
