//! Health probe handler.

use serde::Serialize;

use crate::Context;
use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct HealthReport {
    url: String,
    workspace: String,
    available: bool,
    error: Option<String>,
    status: Option<u16>,
}

fn detail(report: &HealthReport, color: bool) -> String {
    let mut out = format!(
        "GeoServer {} ({}) is {}",
        report.url,
        report.workspace,
        output::availability(report.available, color)
    );
    if let Some(ref error) = report.error {
        out.push_str(&format!("\n  {error}"));
    }
    out
}

pub async fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let available = ctx.connection.check_health().await;
    let health = ctx.connection.health();
    let report = HealthReport {
        url: ctx.connection_config.base_url.to_string(),
        workspace: ctx.connection_config.workspace.clone(),
        available,
        error: health.last_error().map(|e| e.message.clone()),
        status: health.last_error().and_then(|e| e.status),
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &report,
        |r| detail(r, color),
        |r| if r.available { "available".into() } else { "unavailable".into() },
    )?;
    output::print_output(&out, global.quiet);

    if available {
        Ok(())
    } else {
        Err(CliError::Unavailable {
            url: report.url,
            reason: report.error.unwrap_or_default(),
        })
    }
}
