use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

use crate::geometry::BoundingBox;
use crate::params::ProcessingParameters;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    #[serde(default)]
    pub processing: ProcessingParameters,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Device index, `/dev/videoN`, file path, directory of stills or an
    /// MJPEG `http(s)://` URL.
    pub source: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_frame_delay_ms")]
    pub frame_delay_ms: u64,
    /// Restart an image-sequence source from the first file once exhausted.
    #[serde(default)]
    pub loop_sequence: bool,
}

/// One named scoreboard field (clock, home score, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub mode: GroupMode,
    /// `[x0, y0, x1, y1]`: the digit box for `fixed`, the search area for `auto`.
    pub rect: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupMode {
    /// A single declared digit box.
    #[default]
    Fixed,
    /// Digits discovered from contours inside the search rectangle.
    Auto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_ws_addr")]
    pub ws_addr: String,
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    /// Directory holding the browser overlay; `None` disables static files.
    #[serde(default)]
    pub static_dir: Option<String>,
    /// Outbound messages buffered per WebSocket subscriber.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_addr: default_ws_addr(),
            http_addr: default_http_addr(),
            static_dir: None,
            queue_depth: default_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_cpu_sample_secs")]
    pub cpu_sample_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            cpu_sample_secs: default_cpu_sample_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.source.trim().is_empty() {
            return Err(ConfigError::Invalid("capture.source is empty".into()));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Invalid("capture size must be non-zero".into()));
        }
        validate_groups(&self.groups)?;
        validate_params(&self.processing)
    }
}

/// Checks applied to every group list, whether loaded from file or pushed live.
pub fn validate_groups(groups: &[GroupConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for group in groups {
        if group.name.trim().is_empty() {
            return Err(ConfigError::Invalid("group name is empty".into()));
        }
        if group.name == "timestamp" {
            return Err(ConfigError::Invalid(
                "group name \"timestamp\" collides with the message timestamp".into(),
            ));
        }
        if !seen.insert(group.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate group name \"{}\"",
                group.name
            )));
        }
        if group.rect.is_empty() {
            warn!(group = %group.name, rect = ?group.rect, "group rectangle is empty and will never decode");
        }
    }
    Ok(())
}

pub fn validate_params(params: &ProcessingParameters) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&params.max_region_overlap) {
        return Err(ConfigError::Invalid(format!(
            "max_region_overlap {} outside 0..=1",
            params.max_region_overlap
        )));
    }
    if !params.rotation.is_finite() || !params.skew_x.is_finite() || !params.skew_y.is_finite() {
        return Err(ConfigError::Invalid("rotation and skew must be finite".into()));
    }
    if params.skew_x.abs() >= 90.0 || params.skew_y.abs() >= 90.0 {
        return Err(ConfigError::Invalid("skew must be within (-90, 90) degrees".into()));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_width() -> u32 {
    960
}
fn default_height() -> u32 {
    540
}
fn default_frame_delay_ms() -> u64 {
    300
}
fn default_ws_addr() -> String {
    "127.0.0.1:9000".into()
}
fn default_http_addr() -> String {
    "127.0.0.1:8080".into()
}
fn default_queue_depth() -> usize {
    32
}
fn default_cpu_sample_secs() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".into()
}
