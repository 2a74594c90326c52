// ── Map session ──
//
// Owns the single "current raster layer" slot, the base and overlay
// layers, the highlight layer, and the loading/error overlay state.
// Rendering is delegated to a `MapSurface`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::connection::{ConnectionEvent, ConnectionManager, RetryOptions};
use crate::error::CoreError;

use super::layer::{TileEvent, WmsLayerHandle, WmsLayerOptions};
use super::style::{StyleOptions, style_name};
use super::surface::{GeoJsonLayer, HighlightStyle, MapLayer, MapSurface, TileLayer};
use super::viewport::Viewport;

// ── Panes ────────────────────────────────────────────────────────────

pub const RASTER_PANE: &str = "rasterPane";
pub const SZEB_PANE: &str = "szebPane";
pub const HIGHLIGHT_PANE: &str = "highlightPane";
pub const ROADS_PANE: &str = "roadsPane";
pub const BUFFERED_ROADS_PANE: &str = "bufferedRoadsPane";

/// Pane z-indexes, bottom to top.
pub const PANES: [(&str, u32); 5] = [
    (RASTER_PANE, 450),
    (SZEB_PANE, 500),
    (HIGHLIGHT_PANE, 525),
    (ROADS_PANE, 550),
    (BUFFERED_ROADS_PANE, 600),
];

pub const RASTER_OPACITY: f64 = 0.65;

/// Loading is cleared after this even if the layer never reports back.
pub const LOADING_FALLBACK: Duration = Duration::from_secs(10);

/// Errors dismiss themselves after this.
pub const ERROR_DISPLAY: Duration = Duration::from_secs(10);

const OSM_TILES: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
const ESRI_TILES: &str =
    "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}";

struct OverlaySpec {
    key: &'static str,
    label: &'static str,
    layer: &'static str,
    pane: &'static str,
    style: Option<&'static str>,
}

const OVERLAYS: [OverlaySpec; 5] = [
    OverlaySpec {
        key: "seed_zones",
        label: "Seed Zones",
        layer: "SZEBs",
        pane: SZEB_PANE,
        style: None,
    },
    OverlaySpec {
        key: "elevation_bands",
        label: "Elevation Bands",
        layer: "Elev_bands",
        pane: SZEB_PANE,
        style: None,
    },
    OverlaySpec {
        key: "szeb_boundaries",
        label: "SZEB Boundaries",
        layer: "szebs_raw_boundaries_4326",
        pane: SZEB_PANE,
        style: None,
    },
    OverlaySpec {
        key: "roads",
        label: "Roads",
        layer: "roads_ca_4326",
        pane: ROADS_PANE,
        style: None,
    },
    OverlaySpec {
        key: "roads_buffered",
        label: "Roads with 50m buffer",
        layer: "roads_ca_buffer",
        pane: BUFFERED_ROADS_PANE,
        style: Some("buffer_outline_blue"),
    },
];

// ── Public state types ───────────────────────────────────────────────

/// Loading indicator and error banner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverlayStatus {
    pub error: Option<String>,
    pub loading: bool,
}

/// What the legend panel shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LegendView {
    /// No style selected.
    SelectAttribute,
    Loading,
    Image { url: Url },
    Unavailable,
    /// The panel is not shown (e.g. for `Range`).
    Hidden,
}

impl LegendView {
    /// The panel contents as an HTML fragment.
    pub fn to_html(&self) -> String {
        match self {
            Self::SelectAttribute => "Select an attribute".into(),
            Self::Loading => "Loading legend...".into(),
            Self::Image { url } => format!(r#"<img src="{url}" alt="Legend Image" />"#),
            Self::Unavailable => "Legend unavailable".into(),
            Self::Hidden => String::new(),
        }
    }
}

/// An overlay as offered in the layer control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayInfo {
    pub key: &'static str,
    pub label: &'static str,
    pub layer: String,
    pub pane: String,
    pub visible: bool,
}

// ── MapSession ───────────────────────────────────────────────────────

struct Overlay {
    label: &'static str,
    handle: WmsLayerHandle,
}

struct BaseMap {
    base_layers: Vec<TileLayer>,
    active_base: Uuid,
    overlays: IndexMap<&'static str, Overlay>,
}

struct CurrentRaster {
    handle: WmsLayerHandle,
    watcher: JoinHandle<()>,
}

/// One interactive map bound to a `ConnectionManager`.
///
/// Cheaply cloneable via `Arc<SessionInner>`.
#[derive(Clone)]
pub struct MapSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    connection: ConnectionManager,
    surface: Arc<dyn MapSurface>,
    map: Mutex<Option<BaseMap>>,
    current: Mutex<Option<CurrentRaster>>,
    highlight: Mutex<Option<Uuid>>,
    status: Arc<watch::Sender<OverlayStatus>>,
    error_generation: AtomicU64,
    viewport: watch::Sender<Viewport>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MapSession {
    pub fn new(connection: ConnectionManager, surface: Arc<dyn MapSurface>) -> Self {
        let (status, _) = watch::channel(OverlayStatus::default());
        let (viewport, _) = watch::channel(Viewport::default());
        Self {
            inner: Arc::new(SessionInner {
                connection,
                surface,
                map: Mutex::new(None),
                current: Mutex::new(None),
                highlight: Mutex::new(None),
                status: Arc::new(status),
                error_generation: AtomicU64::new(0),
                viewport,
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    pub fn surface(&self) -> &Arc<dyn MapSurface> {
        &self.inner.surface
    }

    // ── Initialization ───────────────────────────────────────────────

    /// Create panes, attach the aerial basemap, and build the overlay
    /// layers. Safe to call repeatedly.
    pub async fn init_map(&self) -> Result<(), CoreError> {
        let mut map = self.inner.map.lock().await;
        if map.is_some() {
            return Ok(());
        }

        let surface = &self.inner.surface;
        for (pane, z_index) in PANES {
            surface.create_pane(pane, z_index);
        }

        let osm = TileLayer::new("OpenStreetMap", OSM_TILES, "© OpenStreetMap contributors");
        let aerial = TileLayer::new("Aerial Imagery", ESRI_TILES, "Imagery © Esri");
        let active_base = aerial.id;
        surface.add_layer(MapLayer::Tile(aerial.clone()));

        let mut overlays = IndexMap::new();
        for spec in &OVERLAYS {
            let mut options = WmsLayerOptions::default().with_pane(spec.pane);
            if let Some(style) = spec.style {
                options = options.with_styles(style);
            }
            let handle = self.inner.connection.get_wms_layer(spec.layer, options)?;
            overlays.insert(
                spec.key,
                Overlay {
                    label: spec.label,
                    handle,
                },
            );
        }

        *map = Some(BaseMap {
            base_layers: vec![osm, aerial],
            active_base,
            overlays,
        });
        info!("map initialized");
        Ok(())
    }

    /// Base layer names, with the active one flagged.
    pub async fn base_layers(&self) -> Vec<(String, bool)> {
        let map = self.inner.map.lock().await;
        map.as_ref().map_or_else(Vec::new, |m| {
            m.base_layers
                .iter()
                .map(|l| (l.name.clone(), l.id == m.active_base))
                .collect()
        })
    }

    /// Switch the basemap. Returns `false` for an unknown name.
    pub async fn set_base_layer(&self, name: &str) -> Result<bool, CoreError> {
        self.init_map().await?;
        let mut map = self.inner.map.lock().await;
        let Some(map) = map.as_mut() else {
            return Ok(false);
        };
        let Some(next) = map.base_layers.iter().find(|l| l.name == name).cloned() else {
            return Ok(false);
        };
        if next.id != map.active_base {
            self.inner.surface.remove_layer(map.active_base);
            map.active_base = next.id;
            self.inner.surface.add_layer(MapLayer::Tile(next));
        }
        Ok(true)
    }

    pub async fn overlays(&self) -> Vec<OverlayInfo> {
        let map = self.inner.map.lock().await;
        let Some(map) = map.as_ref() else {
            return Vec::new();
        };
        map.overlays
            .iter()
            .map(|(key, o)| OverlayInfo {
                key: *key,
                label: o.label,
                layer: o.handle.layer_name().to_owned(),
                pane: o.handle.pane().to_owned(),
                visible: self.inner.surface.has_layer(o.handle.id()),
            })
            .collect()
    }

    /// Show or hide an overlay. Returns `false` for an unknown key.
    pub async fn set_overlay_visible(&self, key: &str, visible: bool) -> Result<bool, CoreError> {
        self.init_map().await?;
        let map = self.inner.map.lock().await;
        let Some(overlay) = map.as_ref().and_then(|m| m.overlays.get(key)) else {
            return Ok(false);
        };
        let id = overlay.handle.id();
        let surface = &self.inner.surface;
        if visible && !surface.has_layer(id) {
            surface.add_layer(MapLayer::Wms(overlay.handle.clone()));
        } else if !visible {
            surface.remove_layer(id);
        }
        Ok(true)
    }

    // ── Viewport ─────────────────────────────────────────────────────

    pub fn viewport(&self) -> Viewport {
        *self.inner.viewport.borrow()
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.inner.viewport.send_replace(viewport);
    }

    // ── Raster layer ─────────────────────────────────────────────────

    /// Replace the current raster layer with one styled for
    /// `(raster_layer, attribute, options)`.
    ///
    /// The previous layer is removed before anything else, so two raster
    /// layers are never attached together. A missing layer or attribute
    /// leaves the slot empty and returns `Ok(None)`.
    pub async fn update_raster_layer(
        &self,
        raster_layer: Option<&str>,
        attribute: Option<&str>,
        options: StyleOptions,
    ) -> Result<Option<WmsLayerHandle>, CoreError> {
        self.init_map().await?;
        self.show_loading();

        let mut current = self.inner.current.lock().await;
        if let Some(previous) = current.take() {
            previous.watcher.abort();
            self.inner.surface.remove_layer(previous.handle.id());
        }

        let (Some(raster_layer), Some(attribute)) = (
            raster_layer.filter(|s| !s.is_empty()),
            attribute.filter(|s| !s.is_empty()),
        ) else {
            self.hide_loading();
            return Ok(None);
        };

        let style = style_name(raster_layer, attribute, options);
        let layer_options = WmsLayerOptions::default()
            .with_styles(style.as_str())
            .with_opacity(RASTER_OPACITY)
            .with_pane(RASTER_PANE)
            .with_param("_t", Utc::now().timestamp_millis().to_string());

        let handle = match self.inner.connection.get_wms_layer(raster_layer, layer_options) {
            Ok(handle) => handle,
            Err(e) => {
                self.hide_loading();
                error!(error = %e, raster_layer, "failed to build raster layer");
                self.show_error(format!("Failed to update map layer. ({e})"));
                return Err(e);
            }
        };

        // Subscribe before attaching so an immediate `load` is not missed.
        let tiles = handle.subscribe_tiles();
        let watcher = tokio::spawn(loading_watcher(tiles, Arc::clone(&self.inner.status)));
        self.inner.surface.add_layer(MapLayer::Wms(handle.clone()));
        debug!(layer = handle.layers(), style, "raster layer attached");

        *current = Some(CurrentRaster {
            handle: handle.clone(),
            watcher,
        });
        Ok(Some(handle))
    }

    pub async fn current_layer(&self) -> Option<WmsLayerHandle> {
        self.inner.current.lock().await.as_ref().map(|c| c.handle.clone())
    }

    /// Detach and reattach the current raster layer so it re-requests tiles.
    pub async fn refresh_current_layer(&self) -> bool {
        let current = self.inner.current.lock().await;
        let Some(current) = current.as_ref() else {
            return false;
        };
        let surface = &self.inner.surface;
        if !surface.has_layer(current.handle.id()) {
            return false;
        }
        surface.remove_layer(current.handle.id());
        surface.add_layer(MapLayer::Wms(current.handle.clone()));
        debug!(layer = current.handle.layers(), "raster layer refreshed");
        true
    }

    // ── Legend ───────────────────────────────────────────────────────

    /// Resolve the legend for `layer_name` rendered with `style_name`.
    ///
    /// An empty style short-circuits to `SelectAttribute`. The result is
    /// always terminal: never `Loading`.
    pub async fn fetch_legend(&self, layer_name: &str, style_name: &str) -> LegendView {
        if style_name.is_empty() {
            return LegendView::SelectAttribute;
        }
        match self
            .inner
            .connection
            .get_legend_url(layer_name, style_name, RetryOptions::default())
            .await
        {
            Ok(Some(url)) => LegendView::Image { url },
            Ok(None) => LegendView::Unavailable,
            Err(e) => {
                error!(error = %e, layer_name, style_name, "legend loading failed");
                LegendView::Unavailable
            }
        }
    }

    // ── Highlight ────────────────────────────────────────────────────

    /// Draw `geojson` on the highlight pane, replacing any previous
    /// highlight. A non-zero `duration` removes it again after that long.
    pub async fn highlight_feature(
        &self,
        geojson: Value,
        style: HighlightStyle,
        duration: Duration,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let mut slot = self.inner.highlight.lock().await;
        if let Some(previous) = slot.take() {
            self.inner.surface.remove_layer(previous);
        }
        self.inner.surface.add_layer(MapLayer::GeoJson(GeoJsonLayer {
            id,
            geojson,
            style,
            pane: HIGHLIGHT_PANE.into(),
        }));
        *slot = Some(id);
        drop(slot);

        if !duration.is_zero() {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let mut slot = inner.highlight.lock().await;
                if *slot == Some(id) {
                    inner.surface.remove_layer(id);
                    *slot = None;
                }
            });
        }
        id
    }

    pub async fn clear_highlight(&self) {
        if let Some(id) = self.inner.highlight.lock().await.take() {
            self.inner.surface.remove_layer(id);
        }
    }

    pub async fn highlight(&self) -> Option<Uuid> {
        *self.inner.highlight.lock().await
    }

    // ── Loading / error overlay ──────────────────────────────────────

    pub fn status(&self) -> OverlayStatus {
        self.inner.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<OverlayStatus> {
        self.inner.status.subscribe()
    }

    pub fn show_loading(&self) {
        set_loading(&self.inner.status, true);
    }

    pub fn hide_loading(&self) {
        set_loading(&self.inner.status, false);
    }

    /// Show an error banner that dismisses itself after [`ERROR_DISPLAY`].
    pub fn show_error(&self, message: impl Into<String>) {
        let message = message.into();
        let generation = self.inner.error_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.status.send_modify(|s| s.error = Some(message));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(ERROR_DISPLAY).await;
            // A newer error restarts the countdown.
            if inner.error_generation.load(Ordering::SeqCst) == generation {
                inner.status.send_if_modified(|s| s.error.take().is_some());
            }
        });
    }

    pub fn hide_error(&self) {
        self.inner
            .status
            .send_if_modified(|s| s.error.take().is_some());
    }

    // ── Connection events ────────────────────────────────────────────

    /// React to connection events: banner on outage, clear and refresh on
    /// recovery, banner when a request exhausts its retries.
    pub async fn bind_connection_events(&self) {
        let rx = self.inner.connection.subscribe();
        let cancel = self.inner.cancel.child_token();
        let handle = tokio::spawn(connection_event_task(self.clone(), rx, cancel));
        self.inner.tasks.lock().await.push(handle);
    }

    /// Stop background tasks and detach the current raster layer.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut tasks = self.inner.tasks.lock().await;
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }
        if let Some(current) = self.inner.current.lock().await.take() {
            current.watcher.abort();
            self.inner.surface.remove_layer(current.handle.id());
        }
    }

    async fn on_connection_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::ConnectionError(err) => {
                error!(message = %err.message, "GeoServer connection error");
                self.show_error(format!(
                    "Unable to connect to GeoServer. Please try again later. ({})",
                    err.message
                ));
            }
            ConnectionEvent::ConnectionRestored { .. } => {
                info!("GeoServer connection restored");
                self.hide_error();
                self.refresh_current_layer().await;
            }
            ConnectionEvent::RequestError(failure) => {
                warn!(
                    attempt = failure.attempt,
                    max_retries = failure.max_retries,
                    layer = ?failure.layer,
                    message = %failure.message,
                    "GeoServer request error"
                );
                if failure.layer.is_none() && failure.is_final() {
                    self.show_error(format!(
                        "Failed to load map data after multiple attempts. ({})",
                        failure.message
                    ));
                }
            }
        }
    }
}

fn set_loading(status: &watch::Sender<OverlayStatus>, loading: bool) {
    status.send_if_modified(|s| {
        if s.loading == loading {
            false
        } else {
            s.loading = loading;
            true
        }
    });
}

async fn loading_watcher(
    mut tiles: broadcast::Receiver<TileEvent>,
    status: Arc<watch::Sender<OverlayStatus>>,
) {
    tokio::select! {
        event = tiles.recv() => debug!(?event, "raster layer settled"),
        () = tokio::time::sleep(LOADING_FALLBACK) => debug!("raster layer loading fallback elapsed"),
    }
    set_loading(&status, false);
}

async fn connection_event_task(
    session: MapSession,
    mut rx: broadcast::Receiver<ConnectionEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(event) => session.on_connection_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "connection event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
