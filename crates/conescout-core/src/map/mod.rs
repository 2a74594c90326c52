// ── Map layer registry ──
//
// Style derivation, WMS layer handles, the rendering boundary, and the
// session that keeps exactly one raster layer in sync with the selection.

pub mod layer;
pub mod session;
pub mod style;
pub mod surface;
pub mod viewport;

pub use layer::{DEFAULT_ERROR_TILE, TileEvent, WmsLayerHandle, WmsLayerOptions};
pub use session::{
    BUFFERED_ROADS_PANE, HIGHLIGHT_PANE, LegendView, MapSession, OverlayInfo, OverlayStatus,
    PANES, RASTER_OPACITY, RASTER_PANE, ROADS_PANE, SZEB_PANE,
};
pub use style::{RANGE_ATTRIBUTE, RANKING_ATTRIBUTE, StyleOptions, style_name};
pub use surface::{
    GeoJsonLayer, HighlightStyle, InMemorySurface, MapLayer, MapSurface, TILE_PANE, TileLayer,
};
pub use viewport::{ContainerPoint, Viewport};
