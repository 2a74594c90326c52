//! Legend resolution through the selection controller.
//!
//! Drives the same species -> attribute -> top-ten sequence as the side
//! panel, so the printed legend is exactly what the map would show.

use conescout_core::{DisplayState, LegendView, SelectionController};

use crate::Context;
use crate::cli::{GlobalOpts, LegendArgs};
use crate::error::CliError;
use crate::output;

use super::{headless_session, load_catalog};

fn detail(display: &DisplayState) -> String {
    let style = display.style.as_deref().unwrap_or("-");
    let legend = match &display.legend {
        LegendView::Image { url } => url.to_string(),
        LegendView::Hidden => "(hidden for Range)".into(),
        other => other.to_html(),
    };
    format!("Style:  {style}\nLegend: {legend}")
}

pub async fn handle(ctx: &Context, args: LegendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let catalog = load_catalog(&ctx.config)?;
    catalog.require(&args.species)?;

    let controller = SelectionController::new(headless_session(ctx), catalog);
    controller.initialize().await?;
    controller.handle_top_ten_change(args.top_ten).await?;
    controller.handle_species_change(&args.species).await?;
    controller.handle_attribute_change(&args.attribute).await?;

    let display = controller.display();
    if display.legend == LegendView::Unavailable {
        return Err(CliError::Api {
            message: format!(
                "Legend unavailable for style {}",
                display.style.as_deref().unwrap_or_default()
            ),
        });
    }

    let out = output::render_single(&global.output, &display, detail, |d| match &d.legend {
        LegendView::Image { url } => url.to_string(),
        _ => String::new(),
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
