// ── Runtime connection configuration ──
//
// These types describe *how* to reach a GeoServer workspace. They carry
// credential data and resilience tuning, but never touch disk.
// The CLI constructs a `ConnectionConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use conescout_api::{Endpoints, TlsMode, TransportConfig};
use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

pub const DEFAULT_URL: &str = "http://localhost:8080/geoserver";
pub const DEFAULT_WORKSPACE: &str = "SZEB_sample";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// HTTP basic credentials for a secured GeoServer.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

/// Configuration for one GeoServer workspace.
///
/// Treated as an immutable snapshot: `ConnectionManager::update_config`
/// swaps in a whole new value rather than mutating fields in place.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// GeoServer root (e.g., `http://localhost:8080/geoserver`).
    pub base_url: Url,
    /// Workspace that prefixes every layer name.
    pub workspace: String,
    pub credentials: Option<Credentials>,
    pub tls: TlsVerification,
    /// Per-request deadline.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retry_attempts: u32,
    /// Lifetime of a cached response.
    pub cache_ttl: Duration,
    pub health_check_enabled: bool,
    pub health_check_interval: Duration,
    /// Preload legend graphics before handing out their URLs.
    pub legend_preload: bool,
    /// Where relative asset paths (species backgrounds) resolve from.
    pub asset_base_url: Option<Url>,
}

impl ConnectionConfig {
    pub fn new(base_url: Url, workspace: impl Into<String>) -> Self {
        Self {
            base_url,
            workspace: workspace.into(),
            credentials: None,
            tls: TlsVerification::default(),
            timeout: DEFAULT_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            cache_ttl: DEFAULT_CACHE_TTL,
            health_check_enabled: true,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            legend_preload: true,
            asset_base_url: None,
        }
    }

    /// Parse a base URL and build a config with default tuning.
    pub fn parse(base_url: &str, workspace: impl Into<String>) -> Result<Self, CoreError> {
        let url = Url::parse(base_url).map_err(|e| CoreError::Config {
            message: format!("invalid GeoServer URL '{base_url}': {e}"),
        })?;
        let config = Self::new(url, workspace);
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no request could succeed with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !matches!(self.base_url.scheme(), "http" | "https") {
            return Err(CoreError::Config {
                message: format!("unsupported URL scheme '{}'", self.base_url.scheme()),
            });
        }
        if self.workspace.trim().is_empty() {
            return Err(CoreError::Config {
                message: "workspace must not be empty".into(),
            });
        }
        if self.workspace.contains([':', '/']) {
            return Err(CoreError::Config {
                message: format!("workspace '{}' must not contain ':' or '/'", self.workspace),
            });
        }
        if self.timeout.is_zero() {
            return Err(CoreError::Config {
                message: "timeout must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(self.base_url.clone(), self.workspace.clone())
    }

    pub fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        let transport = TransportConfig {
            tls,
            timeout: self.timeout,
            auth: None,
        };
        match &self.credentials {
            Some(creds) => transport.with_auth(creds.username.clone(), creds.password.clone()),
            None => transport,
        }
    }

    /// Resolve an asset path against `asset_base_url`.
    ///
    /// Absolute URLs pass through; relative paths need a base.
    pub fn resolve_asset(&self, path: &str) -> Option<Url> {
        if let Ok(url) = Url::parse(path) {
            return Some(url);
        }
        self.asset_base_url.as_ref()?.join(path).ok()
    }
}
