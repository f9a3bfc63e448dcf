use chrono::{DateTime, Local};
use gesture_alert_common::alert::{description, AlertPayload};
use gesture_alert_common::config::AlertConfig;
use gesture_alert_common::gesture::Gesture;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("alert request failed: {0}")]
    Http(reqwest::Error),
    #[error("server returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to append to alert log {0}: {1}")]
    Log(String, std::io::Error),
}

/// Posts alert payloads to the alert server. One attempt per alert, no retries.
pub struct AlertClient {
    client: reqwest::Client,
    url: String,
}

impl AlertClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AlertError::Client)?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Succeeds only on HTTP 200; any other status is an error carrying the body.
    pub async fn send(&self, payload: &AlertPayload) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(AlertError::Http)?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            debug!(url = self.url, "alert accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AlertError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Append-only text log, one line per delivered alert.
pub struct AlertLog {
    path: PathBuf,
}

impl AlertLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, gesture: Gesture, description: &str) -> Result<(), AlertError> {
        let line = log_line(Local::now(), gesture, description);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AlertError::Log(self.path.display().to_string(), e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AlertError::Log(self.path.display().to_string(), e))?;
        file.flush()
            .await
            .map_err(|e| AlertError::Log(self.path.display().to_string(), e))
    }
}

/// `2026-10-16 14:03:07 | PUNHO FECHADO | PUNHO FECHADO detectado`
pub fn log_line(at: DateTime<Local>, gesture: Gesture, description: &str) -> String {
    format!(
        "{} | {} | {}\n",
        at.format("%Y-%m-%d %H:%M:%S"),
        gesture.label().to_uppercase(),
        description
    )
}

/// Audible bell on the terminal.
pub fn beep() {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b"\x07");
    let _ = stdout.flush();
}

/// Delivers an alert for a gesture: POST first, then beep and log only if the
/// server accepted it.
pub struct Notifier {
    client: AlertClient,
    log: AlertLog,
    origin: String,
    beep: bool,
}

impl Notifier {
    pub fn from_config(config: &AlertConfig) -> Result<Self, AlertError> {
        Ok(Self {
            client: AlertClient::new(&config.url, Duration::from_secs(config.timeout_secs))?,
            log: AlertLog::new(&config.log_file),
            origin: config.origin.clone(),
            beep: config.beep,
        })
    }

    /// Returns `true` when the server answered 200.
    pub async fn notify(&self, gesture: Gesture) -> bool {
        let payload = AlertPayload::for_gesture(gesture, &self.origin);

        if let Err(e) = self.client.send(&payload).await {
            error!(error = %e, alert_message = payload.message, "could not send alert");
            return false;
        }

        info!(
            origin = payload.origin,
            alert_message = payload.message,
            severity = payload.severity,
            "[ALERT] sent"
        );
        if self.beep {
            beep();
        }
        if let Err(e) = self.log.append(gesture, &description(gesture)).await {
            warn!(error = %e, path = %self.log.path().display(), "alert delivered but not logged");
        }
        true
    }
}
