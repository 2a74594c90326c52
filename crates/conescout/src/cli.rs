//! Clap derive structures for the `conescout` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// conescout -- query the Cone Scouting Tool's GeoServer layers
#[derive(Debug, Parser)]
#[command(
    name = "conescout",
    version,
    about = "Query seed zone layers, legends, and attributes from GeoServer",
    long_about = "Command-line front end for the Cone Scouting Tool map layers.\n\n\
        Every request goes through the same health-checked, retried, and\n\
        cached connection layer the map uses.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration profile to use
    #[arg(long, short = 'p', env = "CONESCOUT_PROFILE", global = true)]
    pub profile: Option<String>,

    /// GeoServer root URL (overrides profile and GEOSERVER_URL)
    #[arg(long, short = 'u', global = true)]
    pub url: Option<String>,

    /// GeoServer workspace (overrides profile and GEOSERVER_WORKSPACE)
    #[arg(long, short = 'w', global = true)]
    pub workspace: Option<String>,

    /// Per-request timeout, e.g. "30s" or "500ms"
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Retries after the first failed attempt
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CONESCOUT_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Probe GeoServer once and report availability
    Health,

    /// Print the raster style for a layer and attribute (offline)
    Style(StyleArgs),

    /// Resolve the legend graphic for a species and attribute
    Legend(LegendArgs),

    /// Look up seed zone attributes at a point
    Info(InfoArgs),

    /// Run a raw WFS GetFeature query
    Feature(FeatureArgs),

    /// Browse the species catalog
    #[command(alias = "sp")]
    Species(SpeciesArgs),

    /// Region-of-interest helpers on the application server
    Roi(RoiArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Style / legend ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StyleArgs {
    /// Raster layer name (e.g. SZEBxPsme_raster_4326)
    pub raster: String,

    /// Attribute key (e.g. TotalSZEBRanking)
    pub attribute: String,

    /// Only the ten best-ranked zones (ranking attribute only)
    #[arg(long)]
    pub top_ten: bool,
}

#[derive(Debug, Args)]
pub struct LegendArgs {
    /// Species id (e.g. psme)
    pub species: String,

    /// Attribute key
    pub attribute: String,

    /// Only the ten best-ranked zones (ranking attribute only)
    #[arg(long)]
    pub top_ten: bool,
}

// ── Feature info ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Latitude in degrees
    #[arg(allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude in degrees
    #[arg(allow_negative_numbers = true)]
    pub lng: f64,

    /// Species id (defaults to the first enabled species)
    #[arg(long, short = 's')]
    pub species: Option<String>,

    /// Map extent as west,south,east,north
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub bbox: Option<[f64; 4]>,

    /// Map width in pixels
    #[arg(long, default_value = "1024")]
    pub width: u32,

    /// Map height in pixels
    #[arg(long, default_value = "768")]
    pub height: u32,
}

#[derive(Debug, Args)]
pub struct FeatureArgs {
    /// Feature type name without the workspace prefix
    pub type_name: String,

    /// CQL filter (e.g. "OBJECTID=17")
    #[arg(long, short = 'f')]
    pub filter: Option<String>,

    /// Maximum number of features
    #[arg(long, short = 'n')]
    pub count: Option<u32>,
}

/// Parse `west,south,east,north`.
pub fn parse_bbox(raw: &str) -> Result<[f64; 4], String> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid number in bbox: {e}"))?;
    match parts.as_slice() {
        [west, south, east, north] if west < east && south < north => {
            Ok([*west, *south, *east, *north])
        }
        [_, _, _, _] => Err("bbox must satisfy west < east and south < north".into()),
        _ => Err("bbox needs four comma-separated numbers".into()),
    }
}

// ── Species ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SpeciesArgs {
    #[command(subcommand)]
    pub command: SpeciesCommand,
}

#[derive(Debug, Subcommand)]
pub enum SpeciesCommand {
    /// List catalog entries
    #[command(alias = "ls")]
    List {
        /// Include disabled species
        #[arg(long, short = 'a')]
        all: bool,
    },

    /// Show the attribute menu for a species
    Menu {
        /// Species id
        species: String,
    },
}

// ── ROI ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RoiArgs {
    #[command(subcommand)]
    pub command: RoiCommand,
}

#[derive(Debug, Subcommand)]
pub enum RoiCommand {
    /// Report whether a region of interest has been uploaded
    Status {
        /// Also fetch the stored geometry
        #[arg(long)]
        geometry: bool,
    },

    /// Print the shapefile download link for a species
    DownloadUrl {
        /// Species id
        species: String,

        /// Clip to this extent (west,south,east,north) instead of the ROI
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Option<[f64; 4]>,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (secrets masked)
    Show,

    /// Write a profile from the global flags
    Init {
        /// Basic-auth username
        #[arg(long)]
        username: Option<String>,

        /// Application server for species images and ROI endpoints
        #[arg(long)]
        app_url: Option<String>,

        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },

    /// Store the profile's password in the system keyring
    SetPassword,

    /// Print the config file location
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
