//! Display configuration
//!
//! Initial values for the quantities the host normally exposes through
//! reactive cells (levels, averaging, GPU preference, split ratio). Stored as
//! JSON in the platform config directory; a missing file means defaults.

use crate::error::{DisplayError, Result};
use crate::gradient::Palette;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

/// Configuration for spectrum display behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Number of rows kept by the waterfall history
    pub history_count: usize,
    /// Power level drawn at the bottom of the plot (dB)
    pub min_level_db: f32,
    /// Power level drawn at the top of the plot (dB)
    pub max_level_db: f32,
    /// Exponential averaging coefficient in (0, 1], higher = faster tracking
    pub averaging: f32,
    /// Use the GPU shader path when a device is available
    pub prefer_gpu: bool,
    /// Fraction of the viewport height given to the instantaneous plot
    pub split_ratio: f32,
    /// Zoom change per wheel delta unit (zoom *= exp(-delta * k))
    pub zoom_sensitivity: f64,
    /// Waterfall color palette
    pub palette: Palette,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            history_count: 512,
            min_level_db: -130.0,
            max_level_db: -20.0,
            averaging: 0.25,
            prefer_gpu: true,
            split_ratio: 0.5,
            zoom_sensitivity: 0.0005,
            palette: Palette::Classic,
        }
    }
}

impl DisplayConfig {
    /// Default location: `<config dir>/spectrum-view/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("org", "spectrum-view", "spectrum-view")
            .ok_or_else(|| DisplayError::Config("Failed to get project directories".to_string()))?;
        Ok(project_dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from a file, falling back to defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: DisplayConfig = serde_json::from_str(&contents)?;
        Ok(config.validated())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Clamp every field into its usable range
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        self.history_count = self.history_count.max(1);

        if !self.averaging.is_finite() || self.averaging <= 0.0 {
            self.averaging = defaults.averaging;
        }
        self.averaging = self.averaging.min(1.0);

        if !self.split_ratio.is_finite() {
            self.split_ratio = defaults.split_ratio;
        }
        self.split_ratio = self.split_ratio.clamp(0.0, 1.0);

        if !self.min_level_db.is_finite()
            || !self.max_level_db.is_finite()
            || self.min_level_db >= self.max_level_db
        {
            self.min_level_db = defaults.min_level_db;
            self.max_level_db = defaults.max_level_db;
        }

        if !self.zoom_sensitivity.is_finite() || self.zoom_sensitivity <= 0.0 {
            self.zoom_sensitivity = defaults.zoom_sensitivity;
        }

        self
    }
}
