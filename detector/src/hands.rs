use gesture_alert_common::config::DetectorConfig;
use gesture_alert_common::frame::{Frame, CHANNELS};
use gesture_alert_common::landmark::{HandLandmarks, Landmark, HAND_LANDMARK_COUNT};
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

/// How long the helper may take to load its model and print `READY`.
const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Something that finds hands in a preprocessed frame.
pub trait HandDetector {
    async fn detect(&mut self, frame: &Frame) -> Result<Vec<HandLandmarks>, DetectError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("failed to spawn landmark helper: {0}")]
    Spawn(String),
    #[error("landmark helper did not signal ready: {0}")]
    Handshake(String),
    #[error("landmark helper I/O failed: {0}")]
    Io(String),
    #[error("landmark helper closed its output")]
    Closed,
    #[error("landmark helper did not answer within {0:?}")]
    Timeout(Duration),
    #[error("failed to parse landmark helper response: {0}")]
    Parse(String),
    #[error("landmark helper reported: {0}")]
    Helper(String),
}

impl DetectError {
    /// Fatal errors mean the helper is gone; the rest only spoil one frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DetectError::Parse(_) | DetectError::Helper(_))
    }
}

#[derive(Deserialize, Debug)]
struct HandJson {
    #[serde(default)]
    handedness: String,
    #[serde(default)]
    score: f32,
    landmarks: Vec<Landmark>,
}

#[derive(Deserialize, Debug)]
struct DetectionResponse {
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

/// Hand detector backed by an external helper process wrapping the landmark model.
///
/// Protocol, one frame at a time:
/// - helper prints `READY` once its model is loaded;
/// - we write width, height, channels (u32 little-endian) and the raw RGB bytes to its stdin;
/// - it answers with one JSON line: `{"hands": [{"handedness", "score", "landmarks": [{x, y, z}]}], "error"?}`.
pub struct LandmarkHelper {
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    line: String,
    frame_timeout: Duration,
}

impl LandmarkHelper {
    pub async fn spawn(config: &DetectorConfig) -> Result<Self, DetectError> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .args(helper_flags(config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl+C must not kill the helper mid-frame.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| DetectError::Spawn(format!("{}: {e}", config.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DetectError::Spawn("could not get stdin handle".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DetectError::Spawn("could not get stdout handle".into()))?;

        info!(command = config.command, "starting landmark helper");

        let mut helper = Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
            line: String::new(),
            frame_timeout: Duration::from_secs(config.frame_timeout_secs),
        };

        let ready = tokio::time::timeout(READY_TIMEOUT, helper.read_line())
            .await
            .map_err(|_| DetectError::Handshake(format!("no answer within {READY_TIMEOUT:?}")))?
            .map_err(|e| DetectError::Handshake(e.to_string()))?;
        if ready.trim() != "READY" {
            return Err(DetectError::Handshake(format!("got {:?}", ready.trim())));
        }

        info!("landmark helper ready");
        Ok(helper)
    }

    async fn read_line(&mut self) -> Result<String, DetectError> {
        self.line.clear();
        let n = self
            .stdout
            .read_line(&mut self.line)
            .await
            .map_err(|e| DetectError::Io(e.to_string()))?;
        if n == 0 {
            return Err(DetectError::Closed);
        }
        Ok(self.line.clone())
    }

    async fn send_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
        let mut header = [0u8; 12];
        header[0..4].copy_from_slice(&frame.width().to_le_bytes());
        header[4..8].copy_from_slice(&frame.height().to_le_bytes());
        header[8..12].copy_from_slice(&(CHANNELS as u32).to_le_bytes());
        self.stdin.write_all(&header).await?;
        self.stdin.write_all(frame.as_bytes()).await?;
        self.stdin.flush().await
    }
}

impl HandDetector for LandmarkHelper {
    async fn detect(&mut self, frame: &Frame) -> Result<Vec<HandLandmarks>, DetectError> {
        self.send_frame(frame)
            .await
            .map_err(|e| DetectError::Io(e.to_string()))?;
        let timeout = self.frame_timeout;
        let line = tokio::time::timeout(timeout, self.read_line())
            .await
            .map_err(|_| DetectError::Timeout(timeout))??;
        let hands = parse_response(&line)?;
        debug!(seq = frame.seq, hands = hands.len(), "landmark helper answered");
        Ok(hands)
    }
}

/// Flags appended to the helper command line.
fn helper_flags(config: &DetectorConfig) -> Vec<String> {
    vec![
        "--max-hands".into(),
        config.max_hands.to_string(),
        "--min-detection-confidence".into(),
        config.min_detection_confidence.to_string(),
        "--min-tracking-confidence".into(),
        config.min_tracking_confidence.to_string(),
    ]
}

fn parse_response(line: &str) -> Result<Vec<HandLandmarks>, DetectError> {
    let response: DetectionResponse =
        serde_json::from_str(line.trim()).map_err(|e| DetectError::Parse(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(DetectError::Helper(error));
    }

    let hands = response
        .hands
        .into_iter()
        .filter_map(|hand| {
            let parsed = HandLandmarks::from_points(&hand.landmarks, hand.score, hand.handedness);
            if parsed.is_none() {
                warn!(
                    got = hand.landmarks.len(),
                    expected = HAND_LANDMARK_COUNT,
                    "dropping hand with wrong landmark count"
                );
            }
            parsed
        })
        .collect();
    Ok(hands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand_json(count: usize) -> String {
        let points: Vec<String> = (0..count)
            .map(|i| format!(r#"{{"x":0.5,"y":{:.2},"z":0.0}}"#, 0.9 - i as f32 * 0.01))
            .collect();
        format!(
            r#"{{"handedness":"Left","score":0.97,"landmarks":[{}]}}"#,
            points.join(",")
        )
    }

    fn sh_helper(script: &str) -> DetectorConfig {
        DetectorConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            ..DetectorConfig::default()
        }
    }

    #[test]
    fn parses_hands() {
        let line = format!(r#"{{"hands":[{}]}}"#, hand_json(21));
        let hands = parse_response(&line).unwrap();
        assert_eq!(hands.len(), 1);
        assert_eq!(hands[0].handedness, "Left");
        assert!((hands[0].score - 0.97).abs() < 1e-6);
        assert!((hands[0].wrist().y - 0.9).abs() < 1e-6);
    }

    #[test]
    fn drops_incomplete_hands() {
        let line = format!(r#"{{"hands":[{},{}]}}"#, hand_json(5), hand_json(21));
        let hands = parse_response(&line).unwrap();
        assert_eq!(hands.len(), 1);
    }

    #[test]
    fn empty_response_is_no_hands() {
        assert!(parse_response(r#"{"hands":[]}"#).unwrap().is_empty());
        assert!(parse_response("{}").unwrap().is_empty());
    }

    #[test]
    fn helper_error_is_not_fatal() {
        let err = parse_response(r#"{"hands":[],"error":"model blew up"}"#).unwrap_err();
        assert!(matches!(err, DetectError::Helper(ref m) if m == "model blew up"));
        assert!(!err.is_fatal());

        let err = parse_response("not json").unwrap_err();
        assert!(matches!(err, DetectError::Parse(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn flags_carry_detector_settings() {
        let flags = helper_flags(&DetectorConfig::default());
        assert_eq!(
            flags,
            vec![
                "--max-hands",
                "1",
                "--min-detection-confidence",
                "0.5",
                "--min-tracking-confidence",
                "0.5"
            ]
        );
    }

    #[tokio::test]
    async fn round_trip_with_helper_process() {
        // 2x1 RGB frame: 12-byte header + 6 bytes of pixels
        let script = format!(
            "echo READY; head -c 18 >/dev/null; printf '%s\\n' '{{\"hands\":[{}]}}'",
            hand_json(21)
        );
        let mut helper = LandmarkHelper::spawn(&sh_helper(&script)).await.unwrap();
        let frame = Frame::from_rgb(2, 1, vec![10; 6], 0, 0).unwrap();
        let hands = helper.detect(&frame).await.unwrap();
        assert_eq!(hands.len(), 1);
    }

    #[tokio::test]
    async fn wrong_greeting_fails_handshake() {
        let err = LandmarkHelper::spawn(&sh_helper("echo HELLO"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DetectError::Handshake(_)));
    }

    #[tokio::test]
    async fn exited_helper_is_fatal() {
        let mut helper = LandmarkHelper::spawn(&sh_helper("echo READY")).await.unwrap();
        let frame = Frame::from_rgb(2, 1, vec![10; 6], 0, 0).unwrap();
        let err = helper.detect(&frame).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn missing_helper_is_spawn_error() {
        let config = DetectorConfig {
            command: "/nonexistent/landmark-helper".into(),
            ..DetectorConfig::default()
        };
        let err = LandmarkHelper::spawn(&config).await.err().unwrap();
        assert!(matches!(err, DetectError::Spawn(_)));
    }

    #[tokio::test]
    async fn hung_helper_times_out() {
        let config = DetectorConfig {
            frame_timeout_secs: 1,
            ..sh_helper("echo READY; exec sleep 30")
        };
        let mut helper = LandmarkHelper::spawn(&config).await.unwrap();
        let frame = Frame::from_rgb(2, 1, vec![10; 6], 0, 0).unwrap();
        let err = helper.detect(&frame).await.unwrap_err();
        assert!(matches!(err, DetectError::Timeout(d) if d == Duration::from_secs(1)));
        assert!(err.is_fatal());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn helper_runs_in_its_own_process_group() {
        // READY only when the helper leads its own group (field 5 of /proc/<pid>/stat)
        let script = r#"set -- $(cat /proc/$$/stat); if [ "$5" = "$$" ]; then echo READY; else echo SHARED; fi"#;
        assert!(LandmarkHelper::spawn(&sh_helper(script)).await.is_ok());
    }
}
