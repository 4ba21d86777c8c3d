//! Capture, job and output configuration.
//!
//! Settings that an operator may reasonably tune live here. The fixed
//! numeric rules of the photo pipeline (analysis width, upload cap, print
//! resolution) are constants in their own modules.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the camera stream and the framing loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera device index.
    pub device_id: u32,
    /// Requested frame width in pixels.
    pub width: u32,
    /// Requested frame height in pixels.
    pub height: u32,
    /// Requested frames per second.
    pub fps: u32,
    /// Delay between framing analysis ticks, in milliseconds.
    pub analysis_interval_ms: u64,
    /// Run on a fixed sample image instead of a live camera.
    pub demo_mode: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 1280,
            height: 720,
            fps: 30,
            analysis_interval_ms: 200, // ~5 Hz
            demo_mode: false,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Interval between framing analysis ticks.
    pub fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if self.analysis_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval("capture.analysis_interval_ms"));
        }
        Ok(())
    }
}

/// Configuration for the remote variation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Base URL of the generation service.
    pub endpoint: String,
    /// Number of variations a job is expected to produce.
    pub total_variations: u32,
    /// Wall-clock budget measured from submission, in seconds.
    pub timeout_secs: u64,
    /// Delay between status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Ask the service to keep the shoulders in frame.
    pub include_shoulders: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api".to_string(),
            total_variations: 4,
            timeout_secs: 5 * 60,
            poll_interval_ms: 2000,
            include_shoulders: true,
        }
    }
}

impl JobConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if self.total_variations == 0 {
            return Err(ConfigError::InvalidVariationCount);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidInterval("job.timeout_secs"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval("job.poll_interval_ms"));
        }
        Ok(())
    }
}

/// Where outputs and flow state are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for post-processed variations.
    pub directory: PathBuf,
    /// File backing the persisted flow state.
    pub flow_state_path: PathBuf,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            flow_state_path: PathBuf::from("output/flow-state.json"),
            metrics_port: 9090,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("{0} must be greater than zero")]
    InvalidInterval(&'static str),
    #[error("job endpoint is not configured")]
    MissingEndpoint,
    #[error("job must expect at least one variation")]
    InvalidVariationCount,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.job.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = CaptureConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_defaults_match_pipeline_cadence() {
        let config = FileConfig::default();
        assert_eq!(config.capture.analysis_interval(), Duration::from_millis(200));
        assert_eq!(config.job.total_variations, 4);
        assert_eq!(config.job.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = FileConfig::from_toml(
            r#"
            [job]
            endpoint = "https://photos.example.com/api"
            timeout_secs = 120

            [capture]
            demo_mode = true
            "#,
        )
        .unwrap();

        assert_eq!(config.job.endpoint, "https://photos.example.com/api");
        assert_eq!(config.job.timeout_secs, 120);
        assert_eq!(config.job.total_variations, 4);
        assert!(config.capture.demo_mode);
        assert_eq!(config.capture.analysis_interval_ms, 200);
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let result = FileConfig::from_toml("[job]\nendpoint = \"  \"\n");
        assert!(matches!(result, Err(ConfigError::MissingEndpoint)));
    }

    #[test]
    fn test_malformed_toml_reports_parse_error() {
        let result = FileConfig::from_toml("[capture\nwidth = 3");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
