//! Raw WFS GetFeature queries.

use tabled::Tabled;

use conescout_core::{Feature, FeatureOptions};

use crate::Context;
use crate::cli::{FeatureArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Properties")]
    properties: String,
}

fn feature_id(f: &Feature) -> String {
    match &f.id {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

impl From<&Feature> for FeatureRow {
    fn from(f: &Feature) -> Self {
        Self {
            id: feature_id(f),
            properties: serde_json::Value::Object(f.properties.clone()).to_string(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(ctx: &Context, args: FeatureArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let options = FeatureOptions {
        max_features: args.count,
        ..FeatureOptions::default()
    };
    let collection = ctx
        .connection
        .get_feature(&args.type_name, args.filter.as_deref(), options)
        .await?;

    let out = output::render_list(
        &global.output,
        &collection.features,
        |f| FeatureRow::from(f),
        feature_id,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
