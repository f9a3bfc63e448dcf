use std::time::Duration;
use tokio::time::Instant;

/// Suppresses repeat alerts while a gesture stays in view.
///
/// Once an alert has gone out, further alerts are held back until `delay`
/// has elapsed since the last one, unless the gesture disappears in between
/// (see [`Debouncer::reset`]).
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    sent: bool,
    last_alert: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            sent: false,
            last_alert: None,
        }
    }

    /// Whether a gesture seen at `now` should produce an alert.
    pub fn should_alert(&self, now: Instant) -> bool {
        if !self.sent {
            return true;
        }
        match self.last_alert {
            Some(last) => now.saturating_duration_since(last) >= self.delay,
            None => true,
        }
    }

    /// Record a successfully delivered alert.
    pub fn mark_sent(&mut self, now: Instant) {
        self.sent = true;
        self.last_alert = Some(now);
    }

    /// The gesture is no longer in view; the next one alerts immediately.
    pub fn reset(&mut self) {
        self.sent = false;
    }
}
