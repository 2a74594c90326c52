//! Shared configuration for the conescout tools.
//!
//! TOML profiles, `GEOSERVER_*` environment overrides, credential
//! resolution (env + keyring + plaintext), species catalog loading, and
//! translation to `conescout_core::ConnectionConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use conescout_core::config::{
    DEFAULT_CACHE_TTL, DEFAULT_HEALTH_CHECK_INTERVAL, DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT,
    DEFAULT_URL, DEFAULT_WORKSPACE,
};
use conescout_core::{ConnectionConfig, Credentials, SpeciesCatalog, TlsVerification};

const KEYRING_SERVICE: &str = "conescout";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to load species catalog {path}: {reason}")]
    Catalog { path: PathBuf, reason: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named GeoServer profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,

    /// Species catalog TOML; the built-in catalog when unset.
    #[serde(default)]
    pub species_catalog: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
            species_catalog: None,
        }
    }
}

/// Settings every profile inherits unless it overrides them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Per-request deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Response cache lifetime in milliseconds.
    #[serde(default = "default_cache_expiration_ms")]
    pub cache_expiration_ms: u64,

    #[serde(default = "default_true")]
    pub health_check: bool,

    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    #[serde(default = "default_true")]
    pub legend_preload: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            cache_expiration_ms: default_cache_expiration_ms(),
            health_check: true,
            health_check_interval_secs: default_health_check_interval_secs(),
            legend_preload: true,
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}
fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}
fn default_cache_expiration_ms() -> u64 {
    u64::try_from(DEFAULT_CACHE_TTL.as_millis()).unwrap_or(u64::MAX)
}
fn default_health_check_interval_secs() -> u64 {
    DEFAULT_HEALTH_CHECK_INTERVAL.as_secs()
}

/// A named GeoServer profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// GeoServer root (e.g., "http://localhost:8080/geoserver").
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Username for HTTP basic auth; anonymous access when unset.
    pub username: Option<String>,

    /// Password (plaintext, prefer keyring).
    pub password: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS verification.
    pub insecure: Option<bool>,

    pub timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub cache_expiration_ms: Option<u64>,

    /// Application server that hosts species images and ROI endpoints.
    pub app_url: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            url: default_url(),
            workspace: default_workspace(),
            username: None,
            password: None,
            ca_cert: None,
            insecure: None,
            timeout_ms: None,
            retry_attempts: None,
            cache_expiration_ms: None,
            app_url: None,
        }
    }
}

fn default_url() -> String {
    DEFAULT_URL.into()
}
fn default_workspace() -> String {
    DEFAULT_WORKSPACE.into()
}

/// `GEOSERVER_*` environment overrides. Durations are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnvOverrides {
    pub url: Option<String>,
    pub workspace: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub cache_expiration: Option<u64>,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Figment::from(Env::prefixed("GEOSERVER_")).extract()?)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "conescout", "conescout").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("conescout");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load defaults merged with the TOML file at `path` (missing is fine).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profiles ────────────────────────────────────────────────────────

impl Config {
    /// Pick a profile: the named one, else the default profile, else
    /// stock settings under the name `default`.
    pub fn resolve_profile(&self, name: Option<&str>) -> Result<(String, Profile), ConfigError> {
        if let Some(name) = name {
            return self
                .profiles
                .get(name)
                .cloned()
                .map(|p| (name.to_owned(), p))
                .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() });
        }
        let name = self.default_profile.as_deref().unwrap_or("default");
        let profile = self.profiles.get(name).cloned().unwrap_or_default();
        Ok((name.to_owned(), profile))
    }
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/password"),
    )?)
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(password)?;
    Ok(())
}

/// Resolve basic-auth credentials. `None` means anonymous access.
///
/// The password comes from `GEOSERVER_PASSWORD`, then the keyring, then
/// the profile's plaintext `password`.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
    env: &EnvOverrides,
) -> Result<Option<Credentials>, ConfigError> {
    let Some(username) = env.username.clone().or_else(|| profile.username.clone()) else {
        return Ok(None);
    };

    // 1. Env var
    if let Some(ref pw) = env.password {
        return Ok(Some(credentials(username, pw)));
    }

    // 2. Keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(pw) = entry.get_password() {
            return Ok(Some(credentials(username, &pw)));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(Some(credentials(username, pw)));
    }

    Err(ConfigError::Validation {
        field: "password".into(),
        reason: format!("username '{username}' is set for profile '{profile_name}' but no password was found"),
    })
}

fn credentials(username: String, password: &str) -> Credentials {
    Credentials {
        username,
        password: SecretString::from(password.to_owned()),
    }
}

// ── Translation to ConnectionConfig ─────────────────────────────────

/// Build a `ConnectionConfig` from a profile, its defaults, and env overrides.
pub fn to_connection_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    env: &EnvOverrides,
) -> Result<ConnectionConfig, ConfigError> {
    let raw_url = env.url.as_deref().unwrap_or(&profile.url);
    let url = parse_url("url", raw_url)?;
    let workspace = env.workspace.clone().unwrap_or_else(|| profile.workspace.clone());

    let mut config = ConnectionConfig::new(url, workspace);
    config.credentials = resolve_credentials(profile, profile_name, env)?;
    config.tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };
    config.timeout = Duration::from_millis(
        env.timeout
            .or(profile.timeout_ms)
            .unwrap_or(defaults.timeout_ms),
    );
    config.retry_attempts = env
        .retry_attempts
        .or(profile.retry_attempts)
        .unwrap_or(defaults.retry_attempts);
    config.cache_ttl = Duration::from_millis(
        env.cache_expiration
            .or(profile.cache_expiration_ms)
            .unwrap_or(defaults.cache_expiration_ms),
    );
    config.health_check_enabled = defaults.health_check;
    config.health_check_interval = Duration::from_secs(defaults.health_check_interval_secs);
    config.legend_preload = defaults.legend_preload;
    config.asset_base_url = profile
        .app_url
        .as_deref()
        .map(|u| parse_url("app_url", u))
        .transpose()?;

    config.validate().map_err(|e| ConfigError::Validation {
        field: "connection".into(),
        reason: e.to_string(),
    })?;
    Ok(config)
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

// ── Species catalog ─────────────────────────────────────────────────

/// The configured species catalog, or the built-in one.
pub fn load_species_catalog(config: &Config) -> Result<SpeciesCatalog, ConfigError> {
    let Some(path) = config.species_catalog.as_deref() else {
        return Ok(SpeciesCatalog::builtin());
    };
    let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Catalog {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;
    SpeciesCatalog::from_toml_str(&source).map_err(|e| ConfigError::Catalog {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn missing_file_yields_stock_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());

        let (name, profile) = config.resolve_profile(None).unwrap();
        assert_eq!(name, "default");
        assert_eq!(profile.url, "http://localhost:8080/geoserver");
        assert_eq!(profile.workspace, "SZEB_sample");
    }

    #[test]
    fn file_profiles_and_defaults_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            default_profile = "field"

            [defaults]
            retry_attempts = 5
            cache_expiration_ms = 60000

            [profiles.field]
            url = "https://conescout.example.org/geoserver"
            workspace = "SZEB_field"
            timeout_ms = 10000
            "#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        let (name, profile) = config.resolve_profile(None).unwrap();
        assert_eq!(name, "field");

        let conn =
            to_connection_config(&profile, &name, &config.defaults, &EnvOverrides::default())
                .unwrap();
        assert_eq!(conn.base_url.as_str(), "https://conescout.example.org/geoserver");
        assert_eq!(conn.workspace, "SZEB_field");
        assert_eq!(conn.timeout, Duration::from_secs(10));
        assert_eq!(conn.retry_attempts, 5);
        assert_eq!(conn.cache_ttl, Duration::from_secs(60));
        assert!(conn.credentials.is_none());
        assert!(config.resolve_profile(Some("lab")).is_err());
    }

    #[test]
    fn env_overrides_win_over_profile() {
        let profile = Profile {
            username: Some("viewer".into()),
            password: Some("from-file".into()),
            timeout_ms: Some(1_000),
            ..Profile::default()
        };
        let env = EnvOverrides {
            url: Some("http://gs.internal:8080/geoserver".into()),
            workspace: Some("SZEB_prod".into()),
            password: Some("from-env".into()),
            timeout: Some(45_000),
            retry_attempts: Some(1),
            cache_expiration: Some(5_000),
            ..EnvOverrides::default()
        };

        let conn = to_connection_config(&profile, "default", &Defaults::default(), &env).unwrap();

        assert_eq!(conn.base_url.host_str(), Some("gs.internal"));
        assert_eq!(conn.workspace, "SZEB_prod");
        assert_eq!(conn.timeout, Duration::from_millis(45_000));
        assert_eq!(conn.retry_attempts, 1);
        assert_eq!(conn.cache_ttl, Duration::from_millis(5_000));
        let creds = conn.credentials.unwrap();
        assert_eq!(creds.username, "viewer");
        assert_eq!(creds.password.expose_secret(), "from-env");
    }

    #[test]
    fn invalid_values_fail_validation() {
        let bad_url = Profile {
            url: "not a url".into(),
            ..Profile::default()
        };
        assert!(matches!(
            to_connection_config(&bad_url, "x", &Defaults::default(), &EnvOverrides::default()),
            Err(ConfigError::Validation { .. })
        ));

        let empty_ws = Profile {
            workspace: String::new(),
            ..Profile::default()
        };
        assert!(matches!(
            to_connection_config(&empty_ws, "x", &Defaults::default(), &EnvOverrides::default()),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                app_url: Some("https://conescout.example.org/".into()),
                ..Profile::default()
            },
        );

        save_config_to(&config, &path).unwrap();

        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn species_catalog_from_file_or_builtin() {
        assert_eq!(load_species_catalog(&Config::default()).unwrap().len(), 3);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("species.toml");
        std::fs::write(
            &path,
            r#"
            [species.abco]
            display_name = "White Fir"
            scientific_name = "Abies concolor"
            vector_layer = "szeb_abco_vector"
            raster_layer = "SZEBxAbco_raster_4326"
            "#,
        )
        .unwrap();
        let config = Config {
            species_catalog: Some(path),
            ..Config::default()
        };
        let catalog = load_species_catalog(&config).unwrap();
        assert_eq!(catalog.default_species_id(), Some("abco"));

        let missing = Config {
            species_catalog: Some(dir.path().join("nope.toml")),
            ..Config::default()
        };
        assert!(matches!(
            load_species_catalog(&missing),
            Err(ConfigError::Catalog { .. })
        ));
    }
}
