// conescout-api: Async Rust client for the GeoServer and ROI endpoints

pub mod error;
pub mod geo;
pub mod geoserver;
pub mod roi;
pub mod transport;

pub use error::Error;
pub use geo::{BoundingBox, Feature, FeatureCollection, LatLng};
pub use geoserver::{Endpoints, FeatureInfoRequest, GeoServerClient, HEALTH_CHECK_TIMEOUT};
pub use roi::RoiClient;
pub use transport::{BasicAuth, TlsMode, TransportConfig};
