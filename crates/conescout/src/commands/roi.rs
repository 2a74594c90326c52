//! Region-of-interest helpers against the application server.

use serde::Serialize;
use serde_json::Value;
use url::Url;

use conescout_api::RoiClient;
use conescout_core::BoundingBox;

use crate::Context;
use crate::cli::{GlobalOpts, RoiArgs, RoiCommand};
use crate::error::CliError;
use crate::output;

use super::load_catalog;

#[derive(Debug, Serialize)]
struct RoiStatus {
    has_roi: bool,
    geometry: Option<Value>,
}

fn roi_client(ctx: &Context) -> Result<RoiClient, CliError> {
    let raw = ctx.profile.app_url.as_deref().ok_or_else(|| CliError::NoAppUrl {
        profile: ctx.profile_name.clone(),
    })?;
    let base: Url = raw.parse().map_err(|_| CliError::Validation {
        field: "app_url".into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    RoiClient::new(base, &ctx.connection_config.transport()).map_err(|e| CliError::Api {
        message: e.to_string(),
    })
}

pub async fn handle(ctx: &Context, args: RoiArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let client = roi_client(ctx)?;

    let out = match args.command {
        RoiCommand::Status { geometry } => {
            let has_roi = client.has_roi().await;
            let geometry = if geometry && has_roi {
                Some(client.get_roi().await.map_err(|e| CliError::Api {
                    message: e.to_string(),
                })?)
            } else {
                None
            };
            let status = RoiStatus { has_roi, geometry };
            output::render_single(
                &global.output,
                &status,
                |s| {
                    if s.has_roi {
                        "A region of interest is loaded".into()
                    } else {
                        "No region of interest uploaded".into()
                    }
                },
                |s| s.has_roi.to_string(),
            )?
        }

        RoiCommand::DownloadUrl { species, bbox } => {
            let catalog = load_catalog(&ctx.config)?;
            let vector_layer = &catalog.require(&species)?.vector_layer;
            let url = match bbox {
                Some([west, south, east, north]) => client.current_view_download_url(
                    vector_layer,
                    &BoundingBox::new(west, south, east, north),
                ),
                None => client.vector_download_url(vector_layer),
            }
            .map_err(|e| CliError::Api {
                message: e.to_string(),
            })?;
            output::render_single(&global.output, &url, Url::to_string, Url::to_string)?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
