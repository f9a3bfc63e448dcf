use serde::{Deserialize, Serialize};

use crate::gesture::Gesture;

/// JSON body posted to the alert server.
///
/// Field names are fixed by the receiving server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    #[serde(rename = "origem")]
    pub origin: String,
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(rename = "gravidade")]
    pub severity: String,
}

impl AlertPayload {
    pub fn for_gesture(gesture: Gesture, origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            message: description(gesture),
            severity: gesture.severity().to_string(),
        }
    }
}

/// Human-readable description, shared by the payload and the log line.
pub fn description(gesture: Gesture) -> String {
    format!("{} detectado", gesture.label())
}
