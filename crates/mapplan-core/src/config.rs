//! Editor configuration, loaded from JSON.

use crate::boundary::HANDLE_RADIUS_DIVISOR;
use crate::keybindings::{KeyBindingError, KeyBindings};
use crate::viewport::{Viewport, DEFAULT_ZOOM_FACTOR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    KeyBindings(#[from] KeyBindingError),
}

/// Tunables of the editor. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum number of history entries; `None` keeps everything.
    pub history_limit: Option<usize>,
    /// Refuse to record actions that cannot be undone.
    pub require_reversible: bool,
    /// Scale multiplier per ctrl-wheel notch.
    pub zoom_factor: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Vertex handle radius is the longest editor side divided by this.
    pub handle_radius_divisor: f64,
    /// Custom key binding table; the built-in table is used when unset.
    pub keybindings_path: Option<PathBuf>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: None,
            require_reversible: true,
            zoom_factor: DEFAULT_ZOOM_FACTOR,
            min_scale: 0.1,
            max_scale: 10.0,
            handle_radius_divisor: HANDLE_RADIUS_DIVISOR,
            keybindings_path: None,
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zoom_factor <= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "zoom_factor must be greater than 1, got {}",
                self.zoom_factor
            )));
        }
        if self.min_scale <= 0.0 || self.min_scale > self.max_scale {
            return Err(ConfigError::Invalid(format!(
                "scale range {}..{} is empty or not positive",
                self.min_scale, self.max_scale
            )));
        }
        if self.handle_radius_divisor <= 0.0 {
            return Err(ConfigError::Invalid(
                "handle_radius_divisor must be positive".to_string(),
            ));
        }
        if self.history_limit == Some(0) {
            return Err(ConfigError::Invalid("history_limit must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Viewport with this config's zoom settings.
    pub fn viewport(&self) -> Viewport {
        Viewport {
            zoom_factor: self.zoom_factor,
            min_scale: self.min_scale,
            max_scale: self.max_scale,
            ..Viewport::default()
        }
    }

    /// Load the configured key bindings, or the built-in table.
    pub fn keybindings(&self) -> Result<KeyBindings, ConfigError> {
        match &self.keybindings_path {
            Some(path) => Ok(KeyBindings::from_file(path)?),
            None => Ok(KeyBindings::default()),
        }
    }
}
