//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::{CalibrationQuad, Point};
use crate::services::correlator::CorrelationPolicy;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Camera capture backend, resolved once at startup. Selecting the platform
/// backend here keeps runtime branching out of the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    #[default]
    Auto,
    Avfoundation,
    V4l2,
    Synthetic,
}

impl CameraBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraBackend::Auto => "auto",
            CameraBackend::Avfoundation => "avfoundation",
            CameraBackend::V4l2 => "v4l2",
            CameraBackend::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: u32,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default)]
    pub backend: CameraBackend,
}

fn default_camera_width() -> u32 {
    1920
}

fn default_camera_height() -> u32 {
    1080
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_camera_width(),
            height: default_camera_height(),
            backend: CameraBackend::Auto,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_device")]
    pub device: String,
    #[serde(default = "default_serial_baud")]
    pub baud: u32,
    /// Delay after opening the port so the microcontroller can reset
    #[serde(default = "default_serial_settle_ms")]
    pub settle_ms: u64,
}

fn default_serial_device() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_serial_baud() -> u32 {
    115200
}

fn default_serial_settle_ms() -> u64 {
    2000
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: default_serial_device(),
            baud: default_serial_baud(),
            settle_ms: default_serial_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenConfig {
    #[serde(default = "default_screen_width")]
    pub width: u32,
    #[serde(default = "default_screen_height")]
    pub height: u32,
}

fn default_screen_width() -> u32 {
    1920
}

fn default_screen_height() -> u32 {
    1080
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self { width: default_screen_width(), height: default_screen_height() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationConfig {
    /// Camera-space corners of the projected surface, any order
    #[serde(default = "default_corners")]
    pub corners: [[f64; 2]; 4],
}

fn default_corners() -> [[f64; 2]; 4] {
    [[346.0, 204.0], [905.0, 185.0], [943.0, 538.0], [301.0, 542.0]]
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { corners: default_corners() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Exclusive lower bound on blob area (pixels)
    #[serde(default = "default_min_area")]
    pub min_area: f64,
    /// Exclusive upper bound on blob area (pixels)
    #[serde(default = "default_max_area")]
    pub max_area: f64,
}

fn default_min_area() -> f64 {
    5.0
}

fn default_max_area() -> f64 {
    500.0
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self { min_area: default_min_area(), max_area: default_max_area() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorrelationConfig {
    /// Maximum trigger age (ms) still considered matchable
    #[serde(default = "default_max_signal_age_ms")]
    pub max_signal_age_ms: u64,
    #[serde(default)]
    pub policy: CorrelationPolicy,
}

fn default_max_signal_age_ms() -> u64 {
    200
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self { max_signal_age_ms: default_max_signal_age_ms(), policy: CorrelationPolicy::default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// File path for shot records (JSONL format)
    #[serde(default = "default_sink_file")]
    pub file: String,
}

fn default_sink_file() -> String {
    "shots.jsonl".to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self { file: default_sink_file() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    camera_index: u32,
    camera_width: u32,
    camera_height: u32,
    camera_backend: CameraBackend,
    serial_device: String,
    serial_baud: u32,
    serial_settle_ms: u64,
    screen_width: u32,
    screen_height: u32,
    calibration_corners: [[f64; 2]; 4],
    min_area: f64,
    max_area: f64,
    max_signal_age_ms: u64,
    correlation_policy: CorrelationPolicy,
    sink_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            camera_index: toml_config.camera.index,
            camera_width: toml_config.camera.width,
            camera_height: toml_config.camera.height,
            camera_backend: toml_config.camera.backend,
            serial_device: toml_config.serial.device,
            serial_baud: toml_config.serial.baud,
            serial_settle_ms: toml_config.serial.settle_ms,
            screen_width: toml_config.screen.width,
            screen_height: toml_config.screen.height,
            calibration_corners: toml_config.calibration.corners,
            min_area: toml_config.detection.min_area,
            max_area: toml_config.detection.max_area,
            max_signal_age_ms: toml_config.correlation.max_signal_age_ms,
            correlation_policy: toml_config.correlation.policy,
            sink_file: toml_config.sink.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Calibration corners as a quad, in the order given in the file
    pub fn calibration_quad(&self) -> CalibrationQuad {
        CalibrationQuad::new(self.calibration_corners.map(|[x, y]| Point::new(x, y)))
    }

    /// Screen size as floating target dimensions for the mapper
    pub fn screen_size(&self) -> (f64, f64) {
        (self.screen_width as f64, self.screen_height as f64)
    }

    // Getters for all config fields
    pub fn camera_index(&self) -> u32 {
        self.camera_index
    }

    pub fn camera_width(&self) -> u32 {
        self.camera_width
    }

    pub fn camera_height(&self) -> u32 {
        self.camera_height
    }

    pub fn camera_backend(&self) -> CameraBackend {
        self.camera_backend
    }

    pub fn serial_device(&self) -> &str {
        &self.serial_device
    }

    pub fn serial_baud(&self) -> u32 {
        self.serial_baud
    }

    pub fn serial_settle_ms(&self) -> u64 {
        self.serial_settle_ms
    }

    pub fn screen_width(&self) -> u32 {
        self.screen_width
    }

    pub fn screen_height(&self) -> u32 {
        self.screen_height
    }

    pub fn min_area(&self) -> f64 {
        self.min_area
    }

    pub fn max_area(&self) -> f64 {
        self.max_area
    }

    pub fn max_signal_age_ms(&self) -> u64 {
        self.max_signal_age_ms
    }

    pub fn correlation_policy(&self) -> CorrelationPolicy {
        self.correlation_policy
    }

    pub fn sink_file(&self) -> &str {
        &self.sink_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the area band
    #[cfg(test)]
    pub fn with_area_band(mut self, min_area: f64, max_area: f64) -> Self {
        self.min_area = min_area;
        self.max_area = max_area;
        self
    }

    /// Builder method for tests to set the signal age window
    #[cfg(test)]
    pub fn with_max_signal_age_ms(mut self, ms: u64) -> Self {
        self.max_signal_age_ms = ms;
        self
    }
}
