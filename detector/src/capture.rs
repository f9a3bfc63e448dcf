use chrono::Utc;
use gesture_alert_common::config::CaptureConfig;
use gesture_alert_common::frame::{Frame, FrameError};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// ffmpeg stderr lines kept for the error report when it exits non-zero.
const STDERR_TAIL_LINES: usize = 20;

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A V4L2 camera, `/dev/video{index}`.
    Camera(u32),
    /// A video file on disk.
    File(PathBuf),
}

impl Source {
    fn ffmpeg_input(&self) -> String {
        match self {
            Source::Camera(index) => format!("/dev/video{index}"),
            Source::File(path) => path.display().to_string(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Camera(index) => write!(f, "camera {index}"),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    #[error("invalid frame size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("failed to read frame from ffmpeg: {0}")]
    Read(String),
    #[error("ffmpeg exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Anything the frame loop can pull frames from.
pub trait FrameSource {
    /// `Ok(None)` marks the end of the stream.
    async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    fn frames_read(&self) -> u64;
}

/// A running ffmpeg decoder streaming fixed-size `rgb24` frames on stdout.
///
/// The child is killed when the capture is dropped, which releases the device.
/// Its stderr is drained by a background task so a chatty decoder never
/// blocks on a full pipe.
pub struct VideoCapture {
    child: Child,
    stdout: ChildStdout,
    stderr_tail: Option<JoinHandle<VecDeque<String>>>,
    width: u32,
    height: u32,
    seq: u64,
}

impl VideoCapture {
    pub fn open(source: &Source, config: &CaptureConfig) -> Result<Self, CaptureError> {
        if config.width == 0 || config.height == 0 {
            return Err(CaptureError::InvalidSize {
                width: config.width,
                height: config.height,
            });
        }

        let args = ffmpeg_args(source, config);
        let mut command = Command::new(&config.ffmpeg);
        command.args(&args);
        let capture = Self::start(command, config.width, config.height)?;

        debug!(
            source = %source,
            width = config.width,
            height = config.height,
            args = args.join(" "),
            "ffmpeg capture started"
        );
        Ok(capture)
    }

    fn start(mut command: Command, width: u32, height: u32) -> Result<Self, CaptureError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Keep terminal Ctrl+C away from the decoder; we stop it ourselves.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| CaptureError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Spawn("could not get stdout handle".into()))?;
        let stderr_tail = child.stderr.take().map(|pipe| tokio::spawn(drain_stderr(pipe)));

        Ok(Self {
            child,
            stdout,
            stderr_tail,
            width,
            height,
            seq: 0,
        })
    }

    /// Read the next frame. Returns `Ok(None)` once the stream ends cleanly.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let frame_len = Frame::byte_len(self.width, self.height);
        let mut buf = vec![0u8; frame_len];
        let mut filled = 0;

        while filled < frame_len {
            let n = self
                .stdout
                .read(&mut buf[filled..])
                .await
                .map_err(|e| CaptureError::Read(e.to_string()))?;
            if n == 0 {
                if filled > 0 {
                    warn!(filled, frame_len, "stream ended mid-frame, dropping partial frame");
                }
                return self.finish().await.map(|()| None);
            }
            filled += n;
        }

        let seq = self.seq;
        self.seq += 1;
        let frame = Frame::from_rgb(
            self.width,
            self.height,
            buf,
            Utc::now().timestamp_millis(),
            seq,
        )?;
        Ok(Some(frame))
    }

    /// Called at EOF: a non-zero ffmpeg exit becomes an error carrying its stderr.
    async fn finish(&mut self) -> Result<(), CaptureError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| CaptureError::Read(e.to_string()))?;

        if status.success() {
            debug!(frames = self.seq, "ffmpeg exited cleanly");
            return Ok(());
        }

        let stderr = match self.stderr_tail.take() {
            Some(task) => task.await.map(|tail| Vec::from(tail).join("\n")).unwrap_or_default(),
            None => String::new(),
        };
        Err(CaptureError::Exited {
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Read ffmpeg's stderr until it closes, logging each line and keeping the last few.
async fn drain_stderr(pipe: ChildStderr) -> VecDeque<String> {
    let mut reader = BufReader::new(pipe);
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                debug!(line = %line, "ffmpeg");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(e) => {
                warn!(error = %e, "failed to read ffmpeg stderr");
                break;
            }
        }
    }
    tail
}

impl FrameSource for VideoCapture {
    async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.read_frame().await
    }

    fn frames_read(&self) -> u64 {
        self.seq
    }
}

/// Command line for decoding `source` into raw `rgb24` frames on stdout.
pub fn ffmpeg_args(source: &Source, config: &CaptureConfig) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

    match source {
        Source::Camera(_) => {
            args.extend(["-f".into(), "video4linux2".into()]);
        }
        Source::File(_) if config.realtime => {
            args.push("-re".into());
        }
        Source::File(_) => {}
    }

    args.extend([
        "-i".into(),
        source.ffmpeg_input(),
        "-an".into(),
        "-vf".into(),
        format!("scale={}:{}", config.width, config.height),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-f".into(),
        "rawvideo".into(),
        "-".into(),
    ]);
    args
}

/// Check whether ffmpeg is available on PATH. Logs a warning if not found.
pub async fn check_ffmpeg_available(ffmpeg: &str) {
    match Command::new(ffmpeg).arg("-version").output().await {
        Ok(out) if out.status.success() => {
            info!(ffmpeg, "ffmpeg is available");
        }
        Ok(_) => {
            warn!("ffmpeg returned non-zero for -version; capture may fail");
        }
        Err(e) => {
            warn!(
                error = %e,
                ffmpeg,
                "ffmpeg not found; video capture will fail. Install ffmpeg with video4linux2 support."
            );
        }
    }
}
