use std::future::Future;

use gesture_alert_common::gesture::{classify_any, Gesture};
use gesture_alert_common::landmark::HandLandmarks;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureError, FrameSource};
use crate::debounce::Debouncer;
use crate::enhance::{preprocess, Clahe};
use crate::hands::{DetectError, HandDetector};
use crate::notify::Notifier;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("could not open video source: {0}")]
    Open(CaptureError),
    #[error(transparent)]
    Capture(CaptureError),
    #[error(transparent)]
    Detector(#[from] DetectError),
}

/// What happened to one frame's detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    NoGesture,
    /// Gesture seen but still inside the cooldown window.
    Suppressed(Gesture),
    Sent(Gesture),
    /// Gesture seen, alert attempted and not accepted.
    Failed(Gesture),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub alerts_sent: u64,
}

/// The capture, preprocess, detect, classify, debounce, notify loop.
pub struct Pipeline<S, D> {
    source: S,
    detector: D,
    clahe: Clahe,
    debouncer: Debouncer,
    notifier: Notifier,
}

impl<S: FrameSource, D: HandDetector> Pipeline<S, D> {
    pub fn new(source: S, detector: D, clahe: Clahe, debouncer: Debouncer, notifier: Notifier) -> Self {
        Self {
            source,
            detector,
            clahe,
            debouncer,
            notifier,
        }
    }

    /// Run until the stream ends, a fatal error occurs or `shutdown` completes.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<RunSummary, PipelineError> {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();

        loop {
            let next = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutdown requested, stopping");
                    break;
                }
                next = self.source.next_frame() => next,
            };

            let mut frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!(frames = summary.frames, "end of video or camera stopped delivering frames");
                    break;
                }
                Err(e) if self.source.frames_read() == 0 => return Err(PipelineError::Open(e)),
                Err(e) => return Err(PipelineError::Capture(e)),
            };

            summary.frames += 1;
            if summary.frames % 100 == 0 {
                debug!(frames = summary.frames, alerts = summary.alerts_sent, "frames processed");
            }

            preprocess(&mut frame, &self.clahe);

            let detected = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutdown requested, stopping");
                    break;
                }
                detected = self.detector.detect(&frame) => detected,
            };

            let hands = match detected {
                Ok(hands) => hands,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, seq = frame.seq, "hand detection failed for frame");
                    Vec::new()
                }
            };

            if let FrameOutcome::Sent(_) = self.handle_hands(&hands, Instant::now()).await {
                summary.alerts_sent += 1;
            }
        }

        Ok(summary)
    }

    /// Classify the detected hands and alert if the debouncer allows it.
    pub async fn handle_hands(&mut self, hands: &[HandLandmarks], now: Instant) -> FrameOutcome {
        let Some(gesture) = classify_any(hands) else {
            self.debouncer.reset();
            return FrameOutcome::NoGesture;
        };

        if !self.debouncer.should_alert(now) {
            return FrameOutcome::Suppressed(gesture);
        }

        if self.notifier.notify(gesture).await {
            self.debouncer.mark_sent(now);
            FrameOutcome::Sent(gesture)
        } else {
            error!(gesture = %gesture, "alert not delivered");
            FrameOutcome::Failed(gesture)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gesture_alert_common::config::AlertConfig;
    use gesture_alert_common::frame::Frame;
    use gesture_alert_common::landmark::{index, Landmark, HAND_LANDMARK_COUNT};
    use gesture_alert_sink::{router, AlertStore};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    fn hand(wrist_y: f32, tip_y: f32) -> HandLandmarks {
        let mut points = [Landmark::new(0.5, wrist_y); HAND_LANDMARK_COUNT];
        for &i in &index::FINGERTIPS {
            points[i] = Landmark::new(0.5, tip_y);
        }
        HandLandmarks::from_points(&points, 0.9, "Right").unwrap()
    }

    fn fist() -> HandLandmarks {
        hand(0.6, 0.6)
    }

    fn raised() -> HandLandmarks {
        hand(0.8, 0.3)
    }

    fn open_sideways() -> HandLandmarks {
        // fingertips 0.04 above the wrist: neither pose
        hand(0.5, 0.46)
    }

    /// Yields `remaining` blank frames, then ends.
    struct BlankFrames {
        remaining: u64,
        read: u64,
    }

    impl FrameSource for BlankFrames {
        async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            let frame = Frame::from_rgb(4, 4, vec![5; 48], 0, self.read)?;
            self.read += 1;
            Ok(Some(frame))
        }

        fn frames_read(&self) -> u64 {
            self.read
        }
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            Err(CaptureError::Exited {
                status: "exit status: 1".into(),
                stderr: "/dev/video0: No such file or directory".into(),
            })
        }

        fn frames_read(&self) -> u64 {
            0
        }
    }

    /// Replays scripted detections, one entry per frame.
    struct Scripted {
        script: VecDeque<Result<Vec<HandLandmarks>, DetectError>>,
    }

    impl HandDetector for Scripted {
        async fn detect(&mut self, _frame: &Frame) -> Result<Vec<HandLandmarks>, DetectError> {
            self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Never answers, like a helper stuck on a frame.
    struct Stalled;

    impl HandDetector for Stalled {
        async fn detect(&mut self, _frame: &Frame) -> Result<Vec<HandLandmarks>, DetectError> {
            std::future::pending().await
        }
    }

    async fn sink() -> (Arc<AlertStore>, String) {
        let store = Arc::new(AlertStore::new(100));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::clone(&store));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (store, format!("http://{addr}/alerta/"))
    }

    fn notifier(url: String, dir: &tempfile::TempDir) -> Notifier {
        Notifier::from_config(&AlertConfig {
            url,
            log_file: dir.path().join("alert_log.txt"),
            beep: false,
            ..AlertConfig::default()
        })
        .unwrap()
    }

    fn pipeline<S: FrameSource>(
        source: S,
        script: Vec<Result<Vec<HandLandmarks>, DetectError>>,
        notifier: Notifier,
        delay: Duration,
    ) -> Pipeline<S, Scripted> {
        Pipeline::new(
            source,
            Scripted {
                script: script.into(),
            },
            Clahe::new(2.0, 8),
            Debouncer::new(delay),
            notifier,
        )
    }

    #[tokio::test]
    async fn continuous_gesture_alerts_once_within_delay() {
        let (store, url) = sink().await;
        let dir = tempfile::tempdir().unwrap();
        let script = (0..10).map(|_| Ok(vec![fist()])).collect();
        let source = BlankFrames { remaining: 10, read: 0 };

        let mut p = pipeline(source, script, notifier(url, &dir), Duration::from_secs(30));
        let summary = p.run(std::future::pending()).await.unwrap();

        assert_eq!(summary, RunSummary { frames: 10, alerts_sent: 1 });
        assert_eq!(store.recent().len(), 1);
        let log = std::fs::read_to_string(dir.path().join("alert_log.txt")).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[tokio::test]
    async fn gesture_gap_rearms_alert() {
        let (store, url) = sink().await;
        let dir = tempfile::tempdir().unwrap();
        let script = vec![
            Ok(vec![fist()]),
            Ok(vec![fist()]),
            Ok(vec![open_sideways()]),
            Ok(vec![raised()]),
            Ok(vec![raised()]),
        ];
        let source = BlankFrames { remaining: 5, read: 0 };

        let mut p = pipeline(source, script, notifier(url, &dir), Duration::from_secs(30));
        let summary = p.run(std::future::pending()).await.unwrap();

        assert_eq!(summary.alerts_sent, 2);
        let received = store.recent();
        assert_eq!(received[0].payload.severity, "Alta");
        assert_eq!(received[1].payload.message, "MÃO LEVANTADA detectado");
    }

    #[tokio::test]
    async fn cooldown_expiry_allows_repeat() {
        let (_store, url) = sink().await;
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(
            BlankFrames { remaining: 0, read: 0 },
            Vec::new(),
            notifier(url, &dir),
            Duration::from_secs(30),
        );

        let t0 = Instant::now();
        let hands = [fist()];
        assert_eq!(p.handle_hands(&hands, t0).await, FrameOutcome::Sent(Gesture::ClosedFist));
        assert_eq!(
            p.handle_hands(&hands, t0 + Duration::from_secs(29)).await,
            FrameOutcome::Suppressed(Gesture::ClosedFist)
        );
        assert_eq!(
            p.handle_hands(&hands, t0 + Duration::from_secs(30)).await,
            FrameOutcome::Sent(Gesture::ClosedFist)
        );
        assert_eq!(p.handle_hands(&[], t0 + Duration::from_secs(31)).await, FrameOutcome::NoGesture);
        // an empty frame re-arms the debouncer, so the fist alerts again inside the window
        assert_eq!(
            p.handle_hands(&hands, t0 + Duration::from_secs(32)).await,
            FrameOutcome::Sent(Gesture::ClosedFist)
        );
    }

    #[tokio::test]
    async fn failed_delivery_retries_on_next_frame() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let dir = tempfile::tempdir().unwrap();

        let mut p = pipeline(
            BlankFrames { remaining: 0, read: 0 },
            Vec::new(),
            notifier(format!("http://{addr}/alerta/"), &dir),
            Duration::from_secs(30),
        );
        let t0 = Instant::now();
        let hands = [raised()];
        assert_eq!(p.handle_hands(&hands, t0).await, FrameOutcome::Failed(Gesture::RaisedHand));
        assert_eq!(
            p.handle_hands(&hands, t0 + Duration::from_millis(30)).await,
            FrameOutcome::Failed(Gesture::RaisedHand)
        );
        assert!(!dir.path().join("alert_log.txt").exists());
    }

    #[tokio::test]
    async fn non_fatal_detector_errors_are_skipped() {
        let (store, url) = sink().await;
        let dir = tempfile::tempdir().unwrap();
        let script = vec![
            Err(DetectError::Helper("bad frame".into())),
            Err(DetectError::Parse("garbage".into())),
            Ok(vec![fist()]),
        ];
        let source = BlankFrames { remaining: 3, read: 0 };

        let mut p = pipeline(source, script, notifier(url, &dir), Duration::from_secs(30));
        let summary = p.run(std::future::pending()).await.unwrap();
        assert_eq!(summary, RunSummary { frames: 3, alerts_sent: 1 });
        assert_eq!(store.recent().len(), 1);
    }

    #[tokio::test]
    async fn fatal_detector_error_stops_loop() {
        let (_store, url) = sink().await;
        let dir = tempfile::tempdir().unwrap();
        let source = BlankFrames { remaining: 5, read: 0 };

        let mut p = pipeline(source, vec![Err(DetectError::Closed)], notifier(url, &dir), Duration::from_secs(30));
        let err = p.run(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Detector(DetectError::Closed)));
    }

    #[tokio::test]
    async fn source_that_never_opens_is_open_error() {
        let (_store, url) = sink().await;
        let dir = tempfile::tempdir().unwrap();

        let mut p = pipeline(FailingSource, Vec::new(), notifier(url, &dir), Duration::from_secs(30));
        let err = p.run(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Open(_)));
    }

    #[tokio::test]
    async fn shutdown_stops_before_reading() {
        let (_store, url) = sink().await;
        let dir = tempfile::tempdir().unwrap();
        let source = BlankFrames { remaining: 5, read: 0 };

        let mut p = pipeline(source, Vec::new(), notifier(url, &dir), Duration::from_secs(30));
        let summary = p.run(std::future::ready(())).await.unwrap();
        assert_eq!(summary.frames, 0);
    }

    #[tokio::test]
    async fn shutdown_interrupts_pending_detection() {
        let (store, url) = sink().await;
        let dir = tempfile::tempdir().unwrap();
        let mut p = Pipeline::new(
            BlankFrames { remaining: 5, read: 0 },
            Stalled,
            Clahe::new(2.0, 8),
            Debouncer::new(Duration::from_secs(30)),
            notifier(url, &dir),
        );

        let summary = p
            .run(tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(summary, RunSummary { frames: 1, alerts_sent: 0 });
        assert!(store.recent().is_empty());
    }
}
