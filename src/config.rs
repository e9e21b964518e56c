use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::faces::{CropMode, ScanParameters};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Smallest window edge in pixels
    #[serde(default = "default_min_size")]
    pub min_size: u32,

    /// Largest window edge in pixels
    #[serde(default = "default_max_size")]
    pub max_size: u32,

    /// Fraction of the window edge to move between evaluations
    #[serde(default = "default_shift_factor")]
    pub shift_factor: f32,

    /// Window growth between scales
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f32,

    /// Minimum overlap for two detections to merge. 0 merges any overlap.
    #[serde(default)]
    pub iou_threshold: f32,

    /// Clustered score a detection needs to be kept
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    #[serde(default)]
    pub crop_mode: CropMode,

    /// Spread the window scan across threads
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("./facefinder.model")
}

fn default_min_size() -> u32 {
    100
}

fn default_max_size() -> u32 {
    600
}

fn default_shift_factor() -> f32 {
    0.15
}

fn default_scale_factor() -> f32 {
    1.1
}

fn default_min_confidence() -> f32 {
    5.0
}

fn default_parallel() -> bool {
    true
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            max_size: default_max_size(),
            shift_factor: default_shift_factor(),
            scale_factor: default_scale_factor(),
            iou_threshold: 0.0,
            min_confidence: default_min_confidence(),
            crop_mode: CropMode::default(),
            parallel: default_parallel(),
        }
    }
}

impl DetectionConfig {
    pub fn scan_parameters(&self) -> ScanParameters {
        ScanParameters {
            min_size: self.min_size,
            max_size: self.max_size,
            shift_factor: self.shift_factor,
            scale_factor: self.scale_factor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where `0.jpg`, `1.jpg`, ... are written
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_jpeg_quality() -> u8 {
    75
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Stderr,
    File,
    Journald,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub target: LogTarget,

    /// Directory for the rolling log file (`target = "file"`)
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("facefinder")
        .join("logs")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            target: LogTarget::default(),
            directory: default_log_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            detection: DetectionConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load an explicit config file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facefinder")
            .join("config.toml")
    }
}
