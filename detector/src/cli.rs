use std::path::PathBuf;

use clap::Parser;

use crate::capture::Source;

/// Low-light hand gesture detector. Posts an alert when a raised hand or a
/// closed fist is seen.
#[derive(Debug, Parser)]
#[command(name = "gesture-alert")]
pub struct Cli {
    /// Video file to test with. If omitted, the webcam is used.
    #[arg(short = 'v', long = "video", value_name = "PATH")]
    pub video: Option<PathBuf>,

    /// Webcam index.
    #[arg(short = 'c', long = "camera", value_name = "INDEX", default_value_t = 0)]
    pub camera: u32,

    /// Minimum delay between consecutive alerts, in seconds [config default: 30].
    #[arg(short = 'd', long = "delay", value_name = "SECONDS")]
    pub delay: Option<u64>,

    /// TOML config file. Built-in defaults are used if it does not exist.
    #[arg(long = "config", value_name = "PATH", default_value = "config.toml")]
    pub config: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

impl Cli {
    /// The frame source selected on the command line. A video file must exist.
    pub fn source(&self) -> Result<Source, CliError> {
        match &self.video {
            Some(path) if path.is_file() => Ok(Source::File(path.clone())),
            Some(path) => Err(CliError::VideoNotFound(path.display().to_string())),
            None => Ok(Source::Camera(self.camera)),
        }
    }
}
