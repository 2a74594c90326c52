// ── WMS layer handles ──
//
// A handle is what the map surface renders: the WMS endpoint, the qualified
// layer name, and the GetMap parameters. The surface reports tile outcomes
// back through it; the handle forwards failures to the connection events.

use chrono::Utc;
use indexmap::IndexMap;
use tokio::sync::broadcast;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use conescout_api::BoundingBox;

use crate::connection::{ConnectionEvent, RequestFailure};

pub const DEFAULT_ERROR_TILE: &str = "/static/images/error-tile.png";

/// Rendering options for a WMS tile layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WmsLayerOptions {
    pub styles: Option<String>,
    pub format: String,
    pub transparent: bool,
    pub version: String,
    pub opacity: f64,
    pub pane: String,
    pub error_tile_url: String,
    /// Extra GetMap parameters (e.g. `_t` for cache busting).
    pub params: IndexMap<String, String>,
}

impl Default for WmsLayerOptions {
    fn default() -> Self {
        Self {
            styles: None,
            format: "image/png".into(),
            transparent: true,
            version: "1.1.0".into(),
            opacity: 1.0,
            pane: "overlayPane".into(),
            error_tile_url: DEFAULT_ERROR_TILE.into(),
            params: IndexMap::new(),
        }
    }
}

impl WmsLayerOptions {
    pub fn with_styles(mut self, styles: impl Into<String>) -> Self {
        self.styles = Some(styles.into());
        self
    }

    pub fn with_pane(mut self, pane: impl Into<String>) -> Self {
        self.pane = pane.into();
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Tile outcomes reported by whatever renders the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEvent {
    /// Every visible tile finished loading.
    Load,
    /// At least one tile failed.
    TileError,
}

/// A WMS tile layer bound to `workspace:layer`.
#[derive(Debug, Clone)]
pub struct WmsLayerHandle {
    id: Uuid,
    layer_name: String,
    layers: String,
    wms_url: Url,
    options: WmsLayerOptions,
    tile_events: broadcast::Sender<TileEvent>,
    connection_events: broadcast::Sender<ConnectionEvent>,
}

impl PartialEq for WmsLayerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl WmsLayerHandle {
    pub(crate) fn new(
        layer_name: &str,
        layers: String,
        wms_url: Url,
        options: WmsLayerOptions,
        connection_events: broadcast::Sender<ConnectionEvent>,
    ) -> Self {
        let (tile_events, _) = broadcast::channel(16);
        Self {
            id: Uuid::new_v4(),
            layer_name: layer_name.to_owned(),
            layers,
            wms_url,
            options,
            tile_events,
            connection_events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Layer name without the workspace prefix.
    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    /// The `LAYERS` value, `workspace:layer`.
    pub fn layers(&self) -> &str {
        &self.layers
    }

    pub fn wms_url(&self) -> &Url {
        &self.wms_url
    }

    pub fn options(&self) -> &WmsLayerOptions {
        &self.options
    }

    pub fn pane(&self) -> &str {
        &self.options.pane
    }

    pub fn style(&self) -> Option<&str> {
        self.options.styles.as_deref()
    }

    pub fn subscribe_tiles(&self) -> broadcast::Receiver<TileEvent> {
        self.tile_events.subscribe()
    }

    /// Called by the renderer once the visible tiles have loaded.
    pub fn notify_load(&self) {
        let _ = self.tile_events.send(TileEvent::Load);
    }

    /// Called by the renderer when a tile fails. Never errors; the failure
    /// becomes a layer-scoped `RequestError` event.
    pub fn report_tile_error(&self, detail: &str) {
        warn!(layer = %self.layers, detail, "tile loading error");
        let _ = self.tile_events.send(TileEvent::TileError);
        let _ = self
            .connection_events
            .send(ConnectionEvent::RequestError(RequestFailure {
                timestamp: Utc::now(),
                message: "Tile loading failed".into(),
                attempt: 1,
                max_retries: 0,
                timed_out: false,
                layer: Some(self.layer_name.clone()),
            }));
    }

    /// GetMap URL for one tile covering `bbox`.
    pub fn tile_url(&self, bbox: &BoundingBox, width: u32, height: u32) -> Url {
        let mut url = self.wms_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("SERVICE", "WMS")
                .append_pair("REQUEST", "GetMap")
                .append_pair("VERSION", &self.options.version)
                .append_pair("LAYERS", &self.layers)
                .append_pair("STYLES", self.options.styles.as_deref().unwrap_or(""))
                .append_pair("FORMAT", &self.options.format)
                .append_pair("TRANSPARENT", if self.options.transparent { "true" } else { "false" })
                .append_pair("SRS", "EPSG:4326")
                .append_pair("BBOX", &bbox.to_bbox_string())
                .append_pair("WIDTH", &width.to_string())
                .append_pair("HEIGHT", &height.to_string());
            for (key, value) in &self.options.params {
                query.append_pair(key, value);
            }
        }
        url
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn handle(events: broadcast::Sender<ConnectionEvent>) -> WmsLayerHandle {
        WmsLayerHandle::new(
            "SZEBxPsme_raster_4326",
            "SZEB_sample:SZEBxPsme_raster_4326".into(),
            Url::parse("http://gs.example.org/geoserver/SZEB_sample/wms").unwrap(),
            WmsLayerOptions::default()
                .with_styles("SZEBxPsme_raster_4326_range")
                .with_param("_t", "42"),
            events,
        )
    }

    #[test]
    fn tile_url_carries_style_and_extra_params() {
        let (tx, _) = broadcast::channel(4);
        let url = handle(tx).tile_url(&BoundingBox::new(-124.0, 36.0, -120.0, 40.0), 256, 256);
        insta::assert_snapshot!(url.as_str(), @"http://gs.example.org/geoserver/SZEB_sample/wms?SERVICE=WMS&REQUEST=GetMap&VERSION=1.1.0&LAYERS=SZEB_sample%3ASZEBxPsme_raster_4326&STYLES=SZEBxPsme_raster_4326_range&FORMAT=image%2Fpng&TRANSPARENT=true&SRS=EPSG%3A4326&BBOX=-124%2C36%2C-120%2C40&WIDTH=256&HEIGHT=256&_t=42");
    }

    #[test]
    fn tile_error_emits_layer_scoped_request_error() {
        let (tx, mut rx) = broadcast::channel(4);
        let layer = handle(tx);
        let mut tiles = layer.subscribe_tiles();

        layer.report_tile_error("404");

        assert_eq!(tiles.try_recv().unwrap(), TileEvent::TileError);
        match rx.try_recv().unwrap() {
            ConnectionEvent::RequestError(failure) => {
                assert_eq!(failure.layer.as_deref(), Some("SZEBxPsme_raster_4326"));
                assert_eq!(failure.message, "Tile loading failed");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
