use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level configuration. Every section is optional; an empty file yields
/// the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub enhance: EnhanceConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Pace video files at their native frame rate instead of decoding as fast as possible.
    #[serde(default)]
    pub realtime: bool,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnhanceConfig {
    #[serde(default = "default_clip_limit")]
    pub clip_limit: f64,
    #[serde(default = "default_tile_grid")]
    pub tile_grid: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_command")]
    pub command: String,
    #[serde(default = "default_detector_args")]
    pub args: Vec<String>,
    #[serde(default = "default_max_hands")]
    pub max_hands: u32,
    #[serde(default = "default_confidence")]
    pub min_detection_confidence: f32,
    #[serde(default = "default_confidence")]
    pub min_tracking_confidence: f32,
    /// How long to wait for the helper's answer to one frame.
    #[serde(default = "default_frame_timeout_secs")]
    pub frame_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_alert_url")]
    pub url: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_beep")]
    pub beep: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of received alerts kept in memory.
    #[serde(default = "default_history")]
    pub history: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            realtime: false,
            ffmpeg: default_ffmpeg(),
        }
    }
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            clip_limit: default_clip_limit(),
            tile_grid: default_tile_grid(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            command: default_detector_command(),
            args: default_detector_args(),
            max_hands: default_max_hands(),
            min_detection_confidence: default_confidence(),
            min_tracking_confidence: default_confidence(),
            frame_timeout_secs: default_frame_timeout_secs(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            url: default_alert_url(),
            origin: default_origin(),
            timeout_secs: default_timeout_secs(),
            delay_secs: default_delay_secs(),
            log_file: default_log_file(),
            beep: default_beep(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            history: default_history(),
        }
    }
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
        Self::parse(&content)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_ffmpeg() -> String {
    "ffmpeg".into()
}
fn default_clip_limit() -> f64 {
    2.0
}
fn default_tile_grid() -> u32 {
    8
}
fn default_detector_command() -> String {
    "python3".into()
}
fn default_detector_args() -> Vec<String> {
    vec!["scripts/hand_landmarks.py".into()]
}
fn default_max_hands() -> u32 {
    1
}
fn default_confidence() -> f32 {
    0.5
}
fn default_frame_timeout_secs() -> u64 {
    10
}
fn default_alert_url() -> String {
    "http://localhost:6000/alerta/".into()
}
fn default_origin() -> String {
    "Camera_MediaPipe".into()
}
fn default_timeout_secs() -> u64 {
    5
}
fn default_delay_secs() -> u64 {
    30
}
fn default_log_file() -> PathBuf {
    PathBuf::from("alert_log.txt")
}
fn default_beep() -> bool {
    true
}
fn default_listen() -> String {
    "127.0.0.1:6000".into()
}
fn default_history() -> usize {
    100
}
fn default_log_level() -> String {
    "info".into()
}
