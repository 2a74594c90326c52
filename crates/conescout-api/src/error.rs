use thiserror::Error;

/// Top-level error type for the `conescout-api` crate.
///
/// Covers every failure mode of the raw HTTP surface: transport, timeouts,
/// non-2xx statuses, image preloads, and payload decoding.
/// `conescout-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request was aborted because it exceeded its deadline.
    #[error("{service} request timed out after {timeout_ms}ms")]
    Timeout {
        service: &'static str,
        timeout_ms: u64,
    },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Server responses ────────────────────────────────────────────
    /// GeoServer answered with a non-2xx status.
    #[error("{service} request failed with status: {status}")]
    Http { service: &'static str, status: u16 },

    /// The legend graphic could not be loaded as an image.
    #[error("Failed to load legend image")]
    LegendImage,

    /// A non-legend image (e.g. a species background) failed to load.
    #[error("Failed to load image: {url}")]
    ImageLoad { url: String },

    /// The application server rejected an ROI request.
    #[error("ROI request failed: {message}")]
    Roi { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the request was aborted by its deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// The HTTP status code, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub(crate) fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
