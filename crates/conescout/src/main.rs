mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use conescout_config::{Config, EnvOverrides, Profile};
use conescout_core::{ConnectionConfig, ConnectionManager, TlsVerification};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = conescout_config::load_config()?;

    match cli.command {
        // Offline commands never build a connection
        Command::Config(args) => commands::config_cmd::handle(args, &config, &cli.global),
        Command::Style(args) => commands::style::handle(&args, &cli.global),
        Command::Species(args) => commands::species::handle(args, &config, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "conescout", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let ctx = Context::build(config, &cli.global)?;
            tracing::debug!(command = ?cmd, base_url = %ctx.connection_config.base_url, "dispatching command");
            let result = commands::dispatch(cmd, &ctx, &cli.global).await;
            ctx.connection.shutdown().await;
            result
        }
    }
}

/// Everything a network-bound command needs.
pub struct Context {
    pub config: Config,
    pub profile_name: String,
    pub profile: Profile,
    pub connection_config: ConnectionConfig,
    pub connection: ConnectionManager,
}

impl Context {
    fn build(config: Config, global: &GlobalOpts) -> Result<Self, CliError> {
        let (profile_name, profile) = config.resolve_profile(global.profile.as_deref())?;
        let connection_config = resolve_connection_config(&config, &profile_name, &profile, global)?;
        let connection = ConnectionManager::new(connection_config.clone())?;
        Ok(Self {
            config,
            profile_name,
            profile,
            connection_config,
            connection,
        })
    }
}

/// Layer the global flags over the environment, profile, and defaults.
pub fn resolve_connection_config(
    config: &Config,
    profile_name: &str,
    profile: &Profile,
    global: &GlobalOpts,
) -> Result<ConnectionConfig, CliError> {
    let mut env = EnvOverrides::from_env()?;
    if let Some(ref url) = global.url {
        env.url = Some(url.clone());
    }
    if let Some(ref workspace) = global.workspace {
        env.workspace = Some(workspace.clone());
    }
    if let Some(timeout) = global.timeout {
        env.timeout = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
    }
    if let Some(retries) = global.retries {
        env.retry_attempts = Some(retries);
    }

    let mut connection_config =
        conescout_config::to_connection_config(profile, profile_name, &config.defaults, &env)?;
    if global.insecure {
        connection_config.tls = TlsVerification::DangerAcceptInvalid;
    }
    Ok(connection_config)
}
