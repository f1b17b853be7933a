//! Configuration file support for mood-lens.
//!
//! Supports TOML configuration from:
//! - XDG config: `~/.config/mood-lens/config.toml` (lowest priority)
//! - Project-local: `.mood-lens.toml` (searched up directory tree)
//! - CLI flags (highest priority, applied separately)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub models: ModelsConfig,
    pub detector: DetectorConfig,
    pub display: DisplayConfig,
    pub emotion: EmotionConfig,
    pub output: OutputConfig,
}

/// Camera selection.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device index.
    pub device: Option<u32>,
    /// Give up if the stream reports no dimensions within this many seconds.
    pub timeout_secs: Option<u64>,
}

/// Model location.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory path or `http(s)://` base URL.
    pub location: Option<String>,
    /// Per-unit load timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Face detector settings.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum face confidence (0.0-1.0).
    pub score_threshold: Option<f32>,
    /// Non-maximum suppression overlap (0.0-1.0).
    pub iou_threshold: Option<f32>,
}

/// Overlay geometry and refresh rate.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Inference refreshes per second.
    pub fps: Option<u32>,
}

/// Label selection.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Keep the last label while no face is visible.
    pub retain_on_empty: Option<bool>,
    /// Minimum score for an expression bar to be drawn (0.0-1.0).
    pub min_confidence: Option<f32>,
}

/// Output formatting configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "text" or "jsonl".
    pub format: Option<String>,
    /// PNG file the composited overlay is written to.
    pub preview: Option<PathBuf>,
    /// Write the preview every N frames.
    pub preview_every: Option<u64>,
}

impl AppConfig {
    /// Load configuration from XDG and project-local files.
    ///
    /// Priority (lowest to highest):
    /// 1. XDG config: `~/.config/mood-lens/config.toml`
    /// 2. Project-local: `.mood-lens.toml` (searched up from cwd)
    ///
    /// Missing files are silently ignored. Invalid values are logged as warnings.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(xdg_path) = xdg_config_path() {
            if xdg_path.exists() {
                info!("Loading XDG config: {}", xdg_path.display());
                if let Some(xdg_config) = load_file(&xdg_path) {
                    config = xdg_config;
                }
            } else {
                debug!("XDG config not found: {}", xdg_path.display());
            }
        }

        if let Some(project_path) = find_project_config() {
            info!("Loading project config: {}", project_path.display());
            if let Some(project_config) = load_file(&project_path) {
                config.merge(project_config);
            }
        }

        config.warn_invalid();
        config
    }

    /// Load a single explicitly named file, skipping discovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.warn_invalid();
        Ok(config)
    }

    fn warn_invalid(&self) {
        if let Err(e) = self.validate() {
            eprintln!("warning: {e}");
        }
    }

    /// Validate configuration values are within acceptable ranges.
    fn validate(&self) -> Result<(), String> {
        let unit_interval = [
            ("detector.score_threshold", self.detector.score_threshold),
            ("detector.iou_threshold", self.detector.iou_threshold),
            ("emotion.min_confidence", self.emotion.min_confidence),
        ];
        for (key, value) in unit_interval {
            if let Some(t) = value {
                if !(0.0..=1.0).contains(&t) {
                    return Err(format!("{key} must be 0.0-1.0, got {t}"));
                }
            }
        }

        if let Some(fps) = self.display.fps {
            if !(1..=240).contains(&fps) {
                return Err(format!("display.fps must be 1-240, got {fps}"));
            }
        }
        if self.display.width == Some(0) || self.display.height == Some(0) {
            return Err("display.width and display.height must be non-zero".to_string());
        }
        if self.output.preview_every == Some(0) {
            return Err("output.preview_every must be at least 1".to_string());
        }

        if let Some(ref f) = self.output.format {
            if f != "text" && f != "jsonl" {
                return Err(format!("output.format must be 'text' or 'jsonl', got '{f}'"));
            }
        }

        Ok(())
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present.
    fn merge(&mut self, other: Self) {
        self.camera.device = other.camera.device.or(self.camera.device);
        self.camera.timeout_secs = other.camera.timeout_secs.or(self.camera.timeout_secs);

        self.models.location = other
            .models
            .location
            .or_else(|| self.models.location.take());
        self.models.timeout_secs = other.models.timeout_secs.or(self.models.timeout_secs);

        self.detector.score_threshold = other
            .detector
            .score_threshold
            .or(self.detector.score_threshold);
        self.detector.iou_threshold = other.detector.iou_threshold.or(self.detector.iou_threshold);

        self.display.width = other.display.width.or(self.display.width);
        self.display.height = other.display.height.or(self.display.height);
        self.display.fps = other.display.fps.or(self.display.fps);

        self.emotion.retain_on_empty = other
            .emotion
            .retain_on_empty
            .or(self.emotion.retain_on_empty);
        self.emotion.min_confidence = other.emotion.min_confidence.or(self.emotion.min_confidence);

        self.output.format = other.output.format.or_else(|| self.output.format.take());
        self.output.preview = other.output.preview.or_else(|| self.output.preview.take());
        self.output.preview_every = other.output.preview_every.or(self.output.preview_every);
    }
}

/// Get the XDG config file path.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mood-lens").join("config.toml"))
}

/// Find project-local config by searching up from current directory.
fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Search for `.mood-lens.toml` in the given directory and its parents.
fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(".mood-lens.toml"))
        .find(|path| path.exists())
}

/// Load and parse a TOML config file.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };

    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}
