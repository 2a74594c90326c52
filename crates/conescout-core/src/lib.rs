//! Resilience layer and map logic between `conescout-api` and front ends.
//!
//! - **[`ConnectionManager`]**: every GeoServer call goes through it. Adds
//!   health tracking with edge-triggered [`ConnectionEvent`]s, bounded retry
//!   with exponential backoff, a TTL response cache, and atomic config swaps.
//!
//! - **[`MapSession`]**: the layer registry. Keeps exactly one styled raster
//!   layer attached, plus base layers, overlays, the highlight layer, and
//!   the loading/error overlay. Rendering goes through a [`MapSurface`].
//!
//! - **[`SelectionController`]**: turns species / attribute / top-ten
//!   changes into one layer + legend + sidebar refresh, always settling on
//!   the latest selection.
//!
//! - **[`FeatureInfoHandler`]**: two-stage raster-then-vector lookup for a
//!   map click, rendered through [`AttributeTable`].

pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod feature_info;
pub mod map;
pub mod present;
pub mod selection;

// ── Primary re-exports ──────────────────────────────────────────────
pub use catalog::{AttributeSection, Species, SpeciesCatalog};
pub use config::{ConnectionConfig, Credentials, TlsVerification};
pub use connection::{
    ConnectionEvent, ConnectionHealth, ConnectionManager, FeatureInfoOptions, FeatureOptions,
    HealthError, RequestFailure, RetryOptions,
};
pub use error::CoreError;
pub use feature_info::{ClickPopup, FeatureInfoHandler, InfoPanel};
pub use map::{
    InMemorySurface, LegendView, MapLayer, MapSession, MapSurface, OverlayStatus, StyleOptions,
    Viewport, WmsLayerHandle, WmsLayerOptions, style_name,
};
pub use present::{AttributeTable, format_attribute_value};
pub use selection::{
    AttributeMenu, DisplayState, MenuEntry, RefreshOutcome, SelectionController, SelectionState,
};

// Payload types callers need without depending on the api crate directly.
pub use conescout_api::{BoundingBox, Feature, FeatureCollection, LatLng};
