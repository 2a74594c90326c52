// ── Core error types ──
//
// User-facing errors from conescout-core. Consumers see "timed out" and
// "failed" as distinct variants but never raw reqwest errors.
// The `From<conescout_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// Retries were abandoned because the health probe still fails.
    #[error("GeoServer is currently unavailable")]
    ServiceUnavailable,

    #[error("{message}")]
    Timeout { message: String, timeout_ms: u64 },

    #[error("{message}")]
    RequestFailed {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
        /// Worth another attempt: connect failures, 5xx, 429.
        transient: bool,
    },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Selection errors ─────────────────────────────────────────────
    #[error("Species not found: {id}")]
    SpeciesNotFound { id: String },

    #[error("No {what} selected")]
    MissingSelection { what: &'static str },

    #[error("Attribute '{attribute}' is not offered for {species_id}")]
    UnknownAttribute {
        attribute: String,
        species_id: String,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the retry wrapper should try again after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::RequestFailed { transient, .. } => *transient,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => *status,
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<conescout_api::Error> for CoreError {
    fn from(err: conescout_api::Error) -> Self {
        use conescout_api::Error as ApiError;

        let message = err.to_string();
        let transient = err.is_transient();
        match err {
            ApiError::Timeout { timeout_ms, .. } => CoreError::Timeout {
                message,
                timeout_ms,
            },
            ApiError::Transport(ref e) if e.is_timeout() => CoreError::Timeout {
                message,
                timeout_ms: 0,
            },
            ApiError::Transport(ref e) => CoreError::RequestFailed {
                status: e.status().map(|s| s.as_u16()),
                message,
                transient,
            },
            ApiError::Http { status, .. } => CoreError::RequestFailed {
                message,
                status: Some(status),
                transient,
            },
            // GeoServer can serve a broken legend while a style is still loading.
            ApiError::LegendImage | ApiError::ImageLoad { .. } => CoreError::RequestFailed {
                message,
                status: None,
                transient: true,
            },
            ApiError::InvalidUrl(_) | ApiError::Tls(_) => CoreError::Config { message },
            ApiError::Roi { message } | ApiError::Deserialization { message, .. } => {
                CoreError::Api { message }
            }
        }
    }
}
