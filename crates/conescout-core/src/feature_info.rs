// ── Feature-info click handler ──
//
// Two-stage lookup for a map click: the raster pixel value at the click
// is read with GetFeatureInfo, then used as an `OBJECTID` into the
// species' vector layer. A third, best-effort lookup highlights the seed
// zone boundary under the click in the background.
//
// Clicks are numbered; only the newest click may write the panel or the
// highlight, so a slow lookup never overwrites a later one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use conescout_api::LatLng;

use crate::catalog::{Species, SpeciesCatalog};
use crate::connection::{FeatureInfoOptions, FeatureOptions, RetryOptions};
use crate::error::CoreError;
use crate::map::{HighlightStyle, MapSession};
use crate::present::AttributeTable;

/// Vendor option asking GeoServer to include the raster attribute table.
pub const ATTRIBUTE_TABLE_ENV: &str = "addAttributeTable:true";

/// Raw pixel value property returned for single-band rasters.
pub const PIXEL_VALUE_PROPERTY: &str = "GRAY_INDEX";

pub const BOUNDARY_LAYER: &str = "szebs_raw_boundaries_4326";

pub const BOUNDARY_HIGHLIGHT: Duration = Duration::from_millis(5000);

const CAST_TOOL_URL: &str = "https://reforestationtools.org/climate-adapted-seed-tool/cast-v-0-059/";

// ── Panel / popup state ──────────────────────────────────────────────

/// What the info panel shows. Every lookup ends in a non-`Loading` state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InfoPanel {
    /// Nothing clicked yet.
    #[default]
    Idle,
    Loading,
    /// The raster has no feature at the click.
    NoData,
    /// The pixel is the reserved no-data value.
    NoValidData,
    /// The vector layer has no row for the pixel value.
    NoAttributes,
    Table(AttributeTable),
    Error { message: String },
}

impl InfoPanel {
    /// Status line for the non-table states.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Idle | Self::Table(_) => None,
            Self::Loading => Some("Loading attribute data..."),
            Self::NoData => Some("No data available at this location."),
            Self::NoValidData => Some("No valid data at this location."),
            Self::NoAttributes => Some("Could not retrieve attribute data."),
            Self::Error { .. } => Some("Error loading attribute data."),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Loading)
    }
}

/// Popup anchored at the click with links to external tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickPopup {
    /// Latitude to six decimals.
    pub lat: String,
    /// Longitude to six decimals.
    pub lng: String,
    pub cast_tool_url: String,
    pub directions_url: String,
}

impl ClickPopup {
    pub fn new(latlng: LatLng) -> Self {
        let lat = format!("{:.6}", latlng.lat);
        let lng = format!("{:.6}", latlng.lng);
        Self {
            cast_tool_url: format!(
                "{CAST_TOOL_URL}?_inputs_&selectedLocationType=%22Seed%20Source%22&lat={lat}&lon={lng}"
            ),
            directions_url: format!("https://www.google.com/maps/dir/?api=1&destination={lat},{lng}"),
            lat,
            lng,
        }
    }

    pub fn to_html(&self) -> String {
        format!(
            concat!(
                "<div><p>Lat: {lat}, Lng: {lng}</p>",
                r#"<a href="{cast}" target="_blank">Climate-Adapted Seed Tool</a><br>"#,
                r#"<a href="{dir}" target="_blank">Google Maps Driving Directions</a></div>"#,
            ),
            lat = self.lat,
            lng = self.lng,
            cast = self.cast_tool_url,
            dir = self.directions_url,
        )
    }
}

/// Pixel value usable as a vector key. `0`, `null`, and a missing value
/// are the no-data sentinel.
#[allow(clippy::cast_possible_truncation)]
pub fn pixel_index(value: Option<&Value>) -> Option<i64> {
    let index = match value? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract().abs() < f64::EPSILON)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (index != 0).then_some(index)
}

pub fn vector_cache_key(vector_layer: &str, index: i64) -> String {
    format!("vector_{vector_layer}_{index}")
}

// ── FeatureInfoHandler ───────────────────────────────────────────────

/// Cheaply cloneable via `Arc<InfoInner>`.
#[derive(Clone)]
pub struct FeatureInfoHandler {
    inner: Arc<InfoInner>,
}

struct InfoInner {
    session: MapSession,
    catalog: Arc<SpeciesCatalog>,
    panel: watch::Sender<InfoPanel>,
    popup: watch::Sender<Option<ClickPopup>>,
    clicks: AtomicU64,
}

impl FeatureInfoHandler {
    pub fn new(session: MapSession, catalog: Arc<SpeciesCatalog>) -> Self {
        let (panel, _) = watch::channel(InfoPanel::Idle);
        let (popup, _) = watch::channel(None);
        Self {
            inner: Arc::new(InfoInner {
                session,
                catalog,
                panel,
                popup,
                clicks: AtomicU64::new(0),
            }),
        }
    }

    pub fn session(&self) -> &MapSession {
        &self.inner.session
    }

    pub fn panel(&self) -> InfoPanel {
        self.inner.panel.borrow().clone()
    }

    pub fn watch_panel(&self) -> watch::Receiver<InfoPanel> {
        self.inner.panel.subscribe()
    }

    pub fn popup(&self) -> Option<ClickPopup> {
        self.inner.popup.borrow().clone()
    }

    fn is_latest(&self, click: u64) -> bool {
        self.inner.clicks.load(Ordering::SeqCst) == click
    }

    /// Show `panel` if `click` is still the newest click.
    fn set_panel(&self, click: u64, panel: InfoPanel) -> bool {
        self.inner.panel.send_if_modified(|current| {
            if !self.is_latest(click) {
                return false;
            }
            *current = panel;
            true
        })
    }

    /// Look up attributes for a click at `latlng` on `species_id`'s raster.
    ///
    /// Only an unknown species fails; every other outcome, including
    /// request errors, is reported as a terminal [`InfoPanel`]. The
    /// returned panel belongs to this click even when a newer click has
    /// since taken over the shared panel.
    pub async fn handle_click(
        &self,
        species_id: &str,
        latlng: LatLng,
    ) -> Result<InfoPanel, CoreError> {
        let species = self.inner.catalog.require(species_id)?.clone();

        let popup = ClickPopup::new(latlng);
        let mut click = 0;
        self.inner.popup.send_modify(|current| {
            click = self.inner.clicks.fetch_add(1, Ordering::SeqCst) + 1;
            *current = Some(popup.clone());
        });
        self.set_panel(click, InfoPanel::Loading);

        let panel = match self.lookup(&species, latlng).await {
            Ok(panel) => {
                if matches!(panel, InfoPanel::Table(_)) && self.is_latest(click) {
                    let handler = self.clone();
                    tokio::spawn(async move { handler.highlight_boundary(click, popup).await });
                }
                panel
            }
            Err(e) => {
                error!(error = %e, species_id, "error retrieving feature data");
                InfoPanel::Error {
                    message: e.to_string(),
                }
            }
        };
        if !self.set_panel(click, panel.clone()) {
            debug!(click, "click superseded");
        }
        Ok(panel)
    }

    /// Stages one and two. Empty results are calm panels, not errors.
    async fn lookup(&self, species: &Species, latlng: LatLng) -> Result<InfoPanel, CoreError> {
        let session = &self.inner.session;
        let connection = session.connection();

        let raster = connection
            .get_feature_info(
                &species.raster_layer,
                latlng,
                &session.viewport(),
                FeatureInfoOptions {
                    env: Some(ATTRIBUTE_TABLE_ENV.into()),
                    ..FeatureInfoOptions::default()
                },
            )
            .await?;
        let Some(pixel) = raster.first() else {
            return Ok(InfoPanel::NoData);
        };
        let Some(index) = pixel_index(pixel.property(PIXEL_VALUE_PROPERTY)) else {
            debug!(raster_layer = %species.raster_layer, "no-data pixel at click");
            return Ok(InfoPanel::NoValidData);
        };

        let vector_layer = &species.vector_layer;
        let filter = format!("OBJECTID={index}");
        let vector = connection
            .get_feature(
                vector_layer,
                Some(&filter),
                FeatureOptions {
                    retry: RetryOptions::cached(vector_cache_key(vector_layer, index)),
                    ..FeatureOptions::default()
                },
            )
            .await?;
        Ok(match vector.first() {
            Some(feature) => InfoPanel::Table(AttributeTable::build(&feature.properties, species)),
            None => InfoPanel::NoAttributes,
        })
    }

    /// Highlight the boundary polygon under the click. Failures are logged
    /// and raise no connection events.
    async fn highlight_boundary(&self, click: u64, popup: ClickPopup) {
        let session = &self.inner.session;
        let filter = format!("INTERSECTS(the_geom, POINT({} {}))", popup.lng, popup.lat);
        let key = format!("boundary_{}_{}", popup.lng, popup.lat);

        let boundary = match session
            .connection()
            .get_feature(
                BOUNDARY_LAYER,
                Some(&filter),
                FeatureOptions {
                    retry: RetryOptions::cached(key).silent(),
                    ..FeatureOptions::default()
                },
            )
            .await
        {
            Ok(boundary) if !boundary.is_empty() => boundary,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "failed to load SZEB boundary highlight");
                return;
            }
        };
        if !self.is_latest(click) {
            debug!(click, "boundary highlight superseded");
            return;
        }

        match serde_json::to_value(&boundary) {
            Ok(geojson) => {
                session
                    .highlight_feature(geojson, HighlightStyle::default(), BOUNDARY_HIGHLIGHT)
                    .await;
            }
            Err(e) => warn!(error = %e, "boundary geometry could not be encoded"),
        }
    }
}
