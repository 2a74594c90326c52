//! Style name derivation (no network).

use serde::Serialize;

use conescout_core::{StyleOptions, style_name};

use crate::cli::{GlobalOpts, StyleArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct StyleReport<'a> {
    raster_layer: &'a str,
    attribute: &'a str,
    top_ten_only: bool,
    style: String,
}

pub fn handle(args: &StyleArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.raster.is_empty() || args.attribute.is_empty() {
        return Err(CliError::Validation {
            field: "style".into(),
            reason: "raster layer and attribute must not be empty".into(),
        });
    }
    let report = StyleReport {
        raster_layer: &args.raster,
        attribute: &args.attribute,
        top_ten_only: args.top_ten,
        style: style_name(&args.raster, &args.attribute, StyleOptions::top_ten(args.top_ten)),
    };
    let out = output::render_single(
        &global.output,
        &report,
        |r| r.style.clone(),
        |r| r.style.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
