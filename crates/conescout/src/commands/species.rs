//! Species catalog handlers (no network).

use serde::Serialize;
use tabled::Tabled;

use conescout_config::Config;
use conescout_core::selection::MENU_DIVIDER;
use conescout_core::{AttributeMenu, MenuEntry, Species};

use crate::cli::{GlobalOpts, SpeciesArgs, SpeciesCommand};
use crate::error::CliError;
use crate::output;

use super::load_catalog;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SpeciesEntry<'a> {
    id: &'a str,
    #[serde(flatten)]
    species: &'a Species,
}

#[derive(Tabled)]
struct SpeciesRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Scientific Name")]
    scientific_name: String,
    #[tabled(rename = "Raster Layer")]
    raster_layer: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
}

impl From<&SpeciesEntry<'_>> for SpeciesRow {
    fn from(e: &SpeciesEntry<'_>) -> Self {
        Self {
            id: e.id.to_owned(),
            name: e.species.display_name.clone(),
            scientific_name: e.species.scientific_name.clone(),
            raster_layer: e.species.raster_layer.clone(),
            enabled: if e.species.enabled { "yes" } else { "no" }.into(),
        }
    }
}

fn menu_text(menu: &AttributeMenu) -> String {
    menu.entries()
        .iter()
        .map(|entry| match entry {
            MenuEntry::Divider => MENU_DIVIDER.to_owned(),
            MenuEntry::Header { label } => format!("[{label}]"),
            MenuEntry::Option { key, label } => format!("  {key:<24} {label}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: SpeciesArgs, config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let catalog = load_catalog(config)?;

    let out = match args.command {
        SpeciesCommand::List { all } => {
            let entries: Vec<SpeciesEntry<'_>> = catalog
                .all()
                .filter(|(_, s)| all || s.enabled)
                .map(|(id, species)| SpeciesEntry { id, species })
                .collect();
            output::render_list(
                &global.output,
                &entries,
                |e| SpeciesRow::from(e),
                |e| e.id.to_owned(),
            )?
        }

        SpeciesCommand::Menu { species } => {
            let menu = AttributeMenu::build(catalog.require(&species)?);
            output::render_single(&global.output, &menu, menu_text, |m| {
                m.options().collect::<Vec<_>>().join("\n")
            })?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
