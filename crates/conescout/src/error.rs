//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use conescout_config::ConfigError;
use conescout_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("GeoServer at {url} is unavailable")]
    #[diagnostic(
        code(conescout::unavailable),
        help(
            "{reason}\n\
             Check that GeoServer is running, or point at another one with --url."
        )
    )]
    Unavailable { url: String, reason: String },

    #[error("{message}")]
    #[diagnostic(
        code(conescout::request_failed),
        help("The request was retried before giving up. Try again with -v for details.")
    )]
    RequestFailed { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(conescout::timeout),
        help("Increase the deadline with --timeout or check GeoServer responsiveness.")
    )]
    Timeout { message: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(conescout::not_found),
        help("Run: conescout {list_command}")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{message}")]
    #[diagnostic(code(conescout::api_error))]
    Api { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(conescout::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(conescout::profile_not_found),
        help("Create one with: conescout config init --profile {name} --url <URL>")
    )]
    ProfileNotFound { name: String },

    #[error("No application server configured for profile '{profile}'")]
    #[diagnostic(
        code(conescout::no_app_url),
        help("Set one with: conescout config init --profile {profile} --app-url <URL>")
    )]
    NoAppUrl { profile: String },

    #[error(transparent)]
    #[diagnostic(code(conescout::config))]
    Config(ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(conescout::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unavailable { .. } | Self::RequestFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::NoAppUrl { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound { name },
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ServiceUnavailable => CliError::Unavailable {
                url: "(configured GeoServer)".into(),
                reason: "The last health check failed, so the request was not retried.".into(),
            },

            CoreError::Timeout { message, .. } => CliError::Timeout { message },

            CoreError::RequestFailed { message, .. } => CliError::RequestFailed { message },

            CoreError::SpeciesNotFound { id } => CliError::NotFound {
                resource_type: "species".into(),
                identifier: id,
                list_command: "species list --all".into(),
            },

            CoreError::UnknownAttribute {
                attribute,
                species_id,
            } => CliError::NotFound {
                resource_type: "attribute".into(),
                identifier: attribute,
                list_command: format!("species menu {species_id}"),
            },

            CoreError::MissingSelection { what } => CliError::Validation {
                field: what.into(),
                reason: format!("no {what} selected"),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "configuration".into(),
                reason: message,
            },

            CoreError::Api { message } | CoreError::Internal(message) => CliError::Api { message },
        }
    }
}
