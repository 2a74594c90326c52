// ── Connection events ──
//
// Typed notifications broadcast by `ConnectionManager`. Subscribers that
// fall behind lose the oldest events (broadcast semantics).

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::IntoStaticStr;

/// Details of a failed health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthError {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub status: Option<u16>,
}

/// One failed request attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestFailure {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Retry budget of the call; the call makes `max_retries + 1` attempts.
    pub max_retries: u32,
    pub timed_out: bool,
    /// Set for tile failures reported by a WMS layer.
    pub layer: Option<String>,
}

impl RequestFailure {
    /// Whether this was the last attempt of its call.
    pub fn is_final(&self) -> bool {
        self.attempt > self.max_retries
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, IntoStaticStr)]
#[serde(tag = "event", rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ConnectionEvent {
    /// Health went from available to unavailable.
    ConnectionError(HealthError),
    /// Health went from unavailable to available.
    ConnectionRestored {
        timestamp: DateTime<Utc>,
        message: String,
    },
    /// A request attempt failed.
    RequestError(RequestFailure),
}

impl ConnectionEvent {
    /// The event name as used in logs and JSON output.
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(attempt: u32, max_retries: u32) -> RequestFailure {
        RequestFailure {
            timestamp: Utc::now(),
            message: "WFS request failed with status: 503".into(),
            attempt,
            max_retries,
            timed_out: false,
            layer: None,
        }
    }

    #[test]
    fn only_the_last_attempt_is_final() {
        assert!(!failure(1, 3).is_final());
        assert!(!failure(3, 3).is_final());
        assert!(failure(4, 3).is_final());
        assert!(failure(1, 0).is_final());
    }

    #[test]
    fn event_names_are_camel_case() {
        let event = ConnectionEvent::RequestError(failure(1, 0));
        assert_eq!(event.name(), "requestError");
    }
}
