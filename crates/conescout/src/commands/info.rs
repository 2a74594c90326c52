//! Two-stage click lookup: pixel value, then the vector attributes.

use serde::Serialize;

use conescout_core::{
    BoundingBox, ClickPopup, FeatureInfoHandler, InfoPanel, LatLng, Viewport,
};

use crate::Context;
use crate::cli::{GlobalOpts, InfoArgs};
use crate::error::CliError;
use crate::output;

use super::{headless_session, load_catalog};

#[derive(Debug, Serialize)]
struct InfoReport {
    species: String,
    panel: InfoPanel,
    popup: Option<ClickPopup>,
}

fn detail(report: &InfoReport) -> String {
    let mut out = match &report.panel {
        InfoPanel::Table(table) => format!(
            "{} ({})\n{}",
            table.title,
            table.scientific_name,
            output::render_record(table.headers(), table.values())
        ),
        other => other.message().unwrap_or_default().to_owned(),
    };
    if let Some(ref popup) = report.popup {
        out.push_str(&format!(
            "\n\nLocation:   {}, {}\nSeed tool:  {}\nDirections: {}",
            popup.lat, popup.lng, popup.cast_tool_url, popup.directions_url
        ));
    }
    out
}

fn plain(report: &InfoReport) -> String {
    match &report.panel {
        InfoPanel::Table(table) => table
            .columns
            .iter()
            .map(|c| format!("{}\t{}", c.key, c.value))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.message().unwrap_or_default().to_owned(),
    }
}

pub async fn handle(ctx: &Context, args: InfoArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if !(-90.0..=90.0).contains(&args.lat) || !(-180.0..=180.0).contains(&args.lng) {
        return Err(CliError::Validation {
            field: "coordinates".into(),
            reason: format!("{}, {} is not a valid latitude/longitude", args.lat, args.lng),
        });
    }

    let catalog = load_catalog(&ctx.config)?;
    let species = match args.species {
        Some(id) => id,
        None => catalog
            .default_species_id()
            .map(str::to_owned)
            .ok_or_else(|| CliError::Validation {
                field: "species".into(),
                reason: "no enabled species in the catalog".into(),
            })?,
    };

    let session = headless_session(ctx);
    let mut viewport = Viewport::default();
    if let Some([west, south, east, north]) = args.bbox {
        viewport.bounds = BoundingBox::new(west, south, east, north);
    }
    viewport.width = args.width;
    viewport.height = args.height;
    session.set_viewport(viewport);

    let handler = FeatureInfoHandler::new(session.clone(), catalog);
    let panel = handler
        .handle_click(&species, LatLng::new(args.lat, args.lng))
        .await?;
    session.shutdown().await;

    if let InfoPanel::Error { message } = panel {
        return Err(CliError::Api { message });
    }

    let report = InfoReport {
        species,
        panel,
        popup: handler.popup(),
    };
    let out = output::render_single(&global.output, &report, detail, plain)?;
    output::print_output(&out, global.quiet);
    Ok(())
}
