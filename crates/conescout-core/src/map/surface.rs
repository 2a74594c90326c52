// ── Rendering boundary ──
//
// `MapSurface` is everything the session needs from a map renderer:
// panes with z-indexes and a set of attached layers. `InMemorySurface`
// backs headless use (CLI, tests).

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::layer::WmsLayerHandle;

/// A basemap from an XYZ tile service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileLayer {
    pub id: Uuid,
    pub name: String,
    pub url_template: String,
    pub attribution: String,
    pub max_zoom: u8,
}

impl TileLayer {
    pub fn new(name: &str, url_template: &str, attribution: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url_template: url_template.into(),
            attribution: attribution.into(),
            max_zoom: 19,
        }
    }
}

/// Stroke/fill for a highlighted geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightStyle {
    pub color: String,
    pub weight: u32,
    pub opacity: f64,
    pub fill_opacity: f64,
    pub class_name: String,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            color: "#00f".into(),
            weight: 3,
            opacity: 1.0,
            fill_opacity: 0.0,
            class_name: "highlight-glow".into(),
        }
    }
}

/// A GeoJSON overlay drawn client-side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoJsonLayer {
    pub id: Uuid,
    pub geojson: Value,
    pub style: HighlightStyle,
    pub pane: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapLayer {
    Tile(TileLayer),
    Wms(WmsLayerHandle),
    GeoJson(GeoJsonLayer),
}

pub const TILE_PANE: &str = "tilePane";

impl MapLayer {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Tile(t) => t.id,
            Self::Wms(w) => w.id(),
            Self::GeoJson(g) => g.id,
        }
    }

    pub fn pane(&self) -> &str {
        match self {
            Self::Tile(_) => TILE_PANE,
            Self::Wms(w) => w.pane(),
            Self::GeoJson(g) => &g.pane,
        }
    }
}

/// What a map renderer must provide.
pub trait MapSurface: Send + Sync {
    fn create_pane(&self, name: &str, z_index: u32);
    fn pane_z_index(&self, name: &str) -> Option<u32>;
    fn add_layer(&self, layer: MapLayer);
    /// Returns `false` when the layer was not attached.
    fn remove_layer(&self, id: Uuid) -> bool;
    fn has_layer(&self, id: Uuid) -> bool;
    fn layers_in_pane(&self, pane: &str) -> Vec<MapLayer>;
}

/// Headless surface that only tracks attachment state.
///
/// Also records the most layers ever attached to each pane at once.
#[derive(Debug, Default)]
pub struct InMemorySurface {
    panes: DashMap<String, u32>,
    layers: DashMap<Uuid, MapLayer>,
    peaks: DashMap<String, usize>,
}

impl InMemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// High-water mark of simultaneously attached layers in `pane`.
    pub fn peak_layers_in_pane(&self, pane: &str) -> usize {
        self.peaks.get(pane).map_or(0, |p| *p)
    }

    fn count_in_pane(&self, pane: &str) -> usize {
        self.layers.iter().filter(|l| l.pane() == pane).count()
    }
}

impl MapSurface for InMemorySurface {
    fn create_pane(&self, name: &str, z_index: u32) {
        self.panes.insert(name.to_owned(), z_index);
    }

    fn pane_z_index(&self, name: &str) -> Option<u32> {
        self.panes.get(name).map(|z| *z)
    }

    fn add_layer(&self, layer: MapLayer) {
        let pane = layer.pane().to_owned();
        self.layers.insert(layer.id(), layer);
        let count = self.count_in_pane(&pane);
        let mut peak = self.peaks.entry(pane).or_insert(0);
        if count > *peak {
            *peak = count;
        }
    }

    fn remove_layer(&self, id: Uuid) -> bool {
        self.layers.remove(&id).is_some()
    }

    fn has_layer(&self, id: Uuid) -> bool {
        self.layers.contains_key(&id)
    }

    fn layers_in_pane(&self, pane: &str) -> Vec<MapLayer> {
        self.layers
            .iter()
            .filter(|l| l.pane() == pane)
            .map(|l| l.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_attachment_and_peaks() {
        let surface = InMemorySurface::new();
        let a = TileLayer::new("OpenStreetMap", "https://tile/{z}/{x}/{y}.png", "osm");
        let b = TileLayer::new("Aerial Imagery", "https://esri/{z}/{y}/{x}", "esri");
        let (a_id, b_id) = (a.id, b.id);

        surface.add_layer(MapLayer::Tile(a));
        surface.add_layer(MapLayer::Tile(b));
        assert!(surface.remove_layer(a_id));
        assert!(!surface.remove_layer(a_id));

        assert!(surface.has_layer(b_id));
        assert_eq!(surface.layers_in_pane(TILE_PANE).len(), 1);
        assert_eq!(surface.peak_layers_in_pane(TILE_PANE), 2);
    }
}
