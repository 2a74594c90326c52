//! Config subcommand handlers.

use conescout_config::{self as config, Config, Profile};
use conescout_core::ConnectionConfig;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// A copy of `cfg` with plaintext passwords masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some("****".into());
        }
    }
    cfg
}

fn to_toml(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# failed to render config: {e}"))
}

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let shown = redacted(cfg);
            let out = output::render_single(&global.output, &shown, to_toml, to_toml)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init {
            username,
            app_url,
            default,
        } => {
            let name = global.profile.clone().unwrap_or_else(|| "default".into());
            let mut profile = cfg.profiles.get(&name).cloned().unwrap_or_default();
            if let Some(ref url) = global.url {
                profile.url.clone_from(url);
            }
            if let Some(ref workspace) = global.workspace {
                profile.workspace.clone_from(workspace);
            }
            if let Some(timeout) = global.timeout {
                profile.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
            }
            if global.retries.is_some() {
                profile.retry_attempts = global.retries;
            }
            if global.insecure {
                profile.insecure = Some(true);
            }
            if username.is_some() {
                profile.username = username;
            }
            if app_url.is_some() {
                profile.app_url = app_url;
            }
            validate_profile(&profile)?;

            let mut updated = cfg.clone();
            if default || updated.profiles.is_empty() {
                updated.default_profile = Some(name.clone());
            }
            updated.profiles.insert(name.clone(), profile);
            let path = config::save_config(&updated)?;
            if !global.quiet {
                eprintln!("Profile '{name}' written to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let (name, profile) = cfg.resolve_profile(global.profile.as_deref())?;
            if profile.username.is_none() {
                return Err(CliError::Validation {
                    field: "username".into(),
                    reason: format!(
                        "profile '{name}' has no username; set one with: conescout config init --username <NAME>"
                    ),
                });
            }
            let password = rpassword::prompt_password("Password: ").map_err(prompt_err)?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }
            config::store_password(&name, &password)?;
            if !global.quiet {
                eprintln!("Password for '{name}' stored in system keyring");
            }
            Ok(())
        }
    }
}

/// Reject profiles no connection could be built from.
fn validate_profile(profile: &Profile) -> Result<(), CliError> {
    ConnectionConfig::parse(&profile.url, profile.workspace.clone())?;
    if let Some(ref app_url) = profile.app_url {
        url::Url::parse(app_url).map_err(|e| CliError::Validation {
            field: "app_url".into(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
