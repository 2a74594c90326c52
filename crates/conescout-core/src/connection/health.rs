use serde::Serialize;

use super::event::HealthError;

/// Two-state availability flag plus the last probe failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionHealth {
    #[default]
    Available,
    Unavailable(HealthError),
}

impl ConnectionHealth {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    pub fn last_error(&self) -> Option<&HealthError> {
        match self {
            Self::Available => None,
            Self::Unavailable(err) => Some(err),
        }
    }
}

/// What a single probe changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Unchanged,
    WentDown,
    CameUp,
}

impl ConnectionHealth {
    /// Record a probe outcome, returning the edge it crossed (if any).
    ///
    /// A repeated failure refreshes the stored error without a transition.
    pub(crate) fn record(&mut self, outcome: Result<(), HealthError>) -> Transition {
        let was_available = self.is_available();
        match outcome {
            Ok(()) if was_available => Transition::Unchanged,
            Ok(()) => {
                *self = Self::Available;
                Transition::CameUp
            }
            Err(err) => {
                *self = Self::Unavailable(err);
                if was_available {
                    Transition::WentDown
                } else {
                    Transition::Unchanged
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn down(message: &str) -> Result<(), HealthError> {
        Err(HealthError {
            timestamp: Utc::now(),
            message: message.into(),
            status: None,
        })
    }

    #[test]
    fn only_edges_report_transitions() {
        let mut health = ConnectionHealth::default();
        assert_eq!(health.record(Ok(())), Transition::Unchanged);
        assert_eq!(health.record(down("refused")), Transition::WentDown);
        assert_eq!(health.record(down("still refused")), Transition::Unchanged);
        assert_eq!(
            health.last_error().map(|e| e.message.as_str()),
            Some("still refused")
        );
        assert_eq!(health.record(Ok(())), Transition::CameUp);
        assert!(health.is_available());
    }
}
