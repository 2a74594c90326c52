//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod feature;
pub mod health;
pub mod info;
pub mod legend;
pub mod roi;
pub mod species;
pub mod style;

use std::sync::Arc;

use conescout_core::{InMemorySurface, MapSession, SpeciesCatalog};

use crate::Context;
use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a connection-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Health => health::handle(ctx, global).await,
        Command::Legend(args) => legend::handle(ctx, args, global).await,
        Command::Info(args) => info::handle(ctx, args, global).await,
        Command::Feature(args) => feature::handle(ctx, args, global).await,
        Command::Roi(args) => roi::handle(ctx, args, global).await,
        Command::Config(_) | Command::Style(_) | Command::Species(_) | Command::Completions(_) => {
            Err(CliError::Validation {
                field: "command".into(),
                reason: "handled without a GeoServer connection".into(),
            })
        }
    }
}

/// A headless map session on the shared connection.
pub(crate) fn headless_session(ctx: &Context) -> MapSession {
    MapSession::new(ctx.connection.clone(), Arc::new(InMemorySurface::new()))
}

pub(crate) fn load_catalog(config: &conescout_config::Config) -> Result<Arc<SpeciesCatalog>, CliError> {
    Ok(Arc::new(conescout_config::load_species_catalog(config)?))
}
