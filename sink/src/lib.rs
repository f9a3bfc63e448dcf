//! Local receiver for gesture alerts.
//!
//! Stands in for the alert server during development: accepts the same JSON
//! body the detector posts, logs it and keeps the most recent alerts in
//! memory.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use gesture_alert_common::alert::AlertPayload;
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReceivedAlert {
    pub received_at_ms: i64,
    #[serde(flatten)]
    pub payload: AlertPayload,
}

/// Bounded history of received alerts, oldest first.
pub struct AlertStore {
    history: usize,
    alerts: Mutex<VecDeque<ReceivedAlert>>,
}

impl AlertStore {
    pub fn new(history: usize) -> Self {
        Self {
            history,
            alerts: Mutex::new(VecDeque::with_capacity(history)),
        }
    }

    fn push(&self, alert: ReceivedAlert) -> Result<(), StoreError> {
        let mut alerts = self.alerts.lock().map_err(|_| StoreError::Poisoned)?;
        if self.history == 0 {
            return Ok(());
        }
        while alerts.len() >= self.history {
            alerts.pop_front();
        }
        alerts.push_back(alert);
        Ok(())
    }

    /// Snapshot of the retained alerts, oldest first.
    pub fn recent(&self) -> Vec<ReceivedAlert> {
        match self.alerts.lock() {
            Ok(alerts) => alerts.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }
}

#[derive(Debug)]
enum StoreError {
    Poisoned,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn receive_alert(
    State(store): State<Arc<AlertStore>>,
    Json(payload): Json<AlertPayload>,
) -> impl IntoResponse {
    info!(
        origin = payload.origin,
        alert_message = payload.message,
        severity = payload.severity,
        "alert received"
    );

    let alert = ReceivedAlert {
        received_at_ms: Utc::now().timestamp_millis(),
        payload,
    };
    match store.push(alert) {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => {
            error!(error = ?e, "alert store unavailable");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn list_alerts(State(store): State<Arc<AlertStore>>) -> impl IntoResponse {
    Json(store.recent())
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(store: Arc<AlertStore>) -> Router {
    Router::new()
        .route("/alerta/", post(receive_alert))
        .route("/alertas/", get(list_alerts))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}
