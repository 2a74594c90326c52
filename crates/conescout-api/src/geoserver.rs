// GeoServer HTTP client
//
// Wraps `reqwest::Client` with workspace-scoped URL construction for the
// WMS, WFS, and REST endpoints, per-request deadlines, and status
// normalization. Retry, caching, and health bookkeeping live one layer up
// in `conescout-core`; nothing here holds mutable state.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, millis};
use crate::geo::{BoundingBox, FeatureCollection};
use crate::transport::TransportConfig;

/// Deadline for the REST health probe, independent of the request timeout.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const PREVIEW_CHARS: usize = 200;

// ── Endpoints ────────────────────────────────────────────────────────

/// Base URL + workspace, and every endpoint derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: Url,
    workspace: String,
}

impl Endpoints {
    pub fn new(base_url: Url, workspace: impl Into<String>) -> Self {
        Self {
            base_url,
            workspace: workspace.into(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// `workspace:layer`, the form every OGC request expects.
    pub fn qualified(&self, layer: &str) -> String {
        format!("{}:{layer}", self.workspace)
    }

    fn root(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// `{base}/{workspace}/wms`
    pub fn wms_url(&self) -> Result<Url, Error> {
        Ok(Url::parse(&format!("{}/{}/wms", self.root(), self.workspace))?)
    }

    /// `{base}/{workspace}/wfs`
    pub fn wfs_url(&self) -> Result<Url, Error> {
        Ok(Url::parse(&format!("{}/{}/wfs", self.root(), self.workspace))?)
    }

    /// `{base}/wms` -- GetLegendGraphic is served from the global endpoint.
    pub fn legend_endpoint(&self) -> Result<Url, Error> {
        Ok(Url::parse(&format!("{}/wms", self.root()))?)
    }

    /// `{base}/rest/about/version.json`
    pub fn health_url(&self) -> Result<Url, Error> {
        Ok(Url::parse(&format!("{}/rest/about/version.json", self.root()))?)
    }
}

// ── Request parameters ───────────────────────────────────────────────

/// Everything a WMS 1.1.1 GetFeatureInfo call needs besides the layer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInfoRequest {
    /// Current map extent.
    pub bbox: BoundingBox,
    /// Map size in pixels.
    pub width: u32,
    pub height: u32,
    /// Click position in container pixels.
    pub x: i64,
    pub y: i64,
    pub feature_count: u32,
    pub styles: Option<String>,
    /// Vendor `ENV` parameter, e.g. `addAttributeTable:true`.
    pub env: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

/// Raw HTTP client for a single GeoServer workspace.
///
/// Every request carries an explicit deadline. A request that exceeds it is
/// dropped (aborting the connection) and reported as [`Error::Timeout`],
/// distinct from [`Error::Http`] for non-2xx answers.
#[derive(Debug, Clone)]
pub struct GeoServerClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    transport: TransportConfig,
}

impl GeoServerClient {
    /// Create a new client from a `TransportConfig`.
    pub fn new(endpoints: Endpoints, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            endpoints,
            transport: transport.clone(),
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        endpoints: Endpoints,
        transport: TransportConfig,
    ) -> Self {
        Self {
            http,
            endpoints,
            transport,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The per-request deadline.
    pub fn timeout(&self) -> Duration {
        self.transport.timeout
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// WFS 2.0.0 GetFeature returning GeoJSON.
    pub fn get_feature_url(
        &self,
        type_name: &str,
        cql_filter: Option<&str>,
        max_features: Option<u32>,
    ) -> Result<Url, Error> {
        let mut url = self.endpoints.wfs_url()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("service", "WFS")
                .append_pair("version", "2.0.0")
                .append_pair("request", "GetFeature")
                .append_pair("typeName", &self.endpoints.qualified(type_name))
                .append_pair("outputFormat", "application/json");
            if let Some(filter) = cql_filter.filter(|f| !f.is_empty()) {
                query.append_pair("cql_filter", filter);
            }
            if let Some(count) = max_features {
                query.append_pair("count", &count.to_string());
            }
        }
        Ok(url)
    }

    /// WMS 1.1.1 GetFeatureInfo returning JSON.
    pub fn feature_info_url(&self, layer: &str, req: &FeatureInfoRequest) -> Result<Url, Error> {
        let qualified = self.endpoints.qualified(layer);
        let mut url = self.endpoints.wms_url()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("SERVICE", "WMS")
                .append_pair("VERSION", "1.1.1")
                .append_pair("REQUEST", "GetFeatureInfo")
                .append_pair("LAYERS", &qualified)
                .append_pair("QUERY_LAYERS", &qualified)
                .append_pair("BBOX", &req.bbox.to_bbox_string())
                .append_pair("WIDTH", &req.width.to_string())
                .append_pair("HEIGHT", &req.height.to_string())
                .append_pair("X", &req.x.to_string())
                .append_pair("Y", &req.y.to_string())
                .append_pair("SRS", "EPSG:4326")
                .append_pair("INFO_FORMAT", "application/json")
                .append_pair("FEATURE_COUNT", &req.feature_count.to_string());
            if let Some(styles) = req.styles.as_deref() {
                query.append_pair("STYLES", styles);
            }
            if let Some(env) = req.env.as_deref() {
                query.append_pair("ENV", env);
            }
        }
        Ok(url)
    }

    /// WMS GetLegendGraphic with a cache-busting `_t` parameter.
    pub fn legend_url(&self, layer: &str, style: &str, cache_bust: i64) -> Result<Url, Error> {
        let mut url = self.endpoints.legend_endpoint()?;
        url.query_pairs_mut()
            .append_pair("REQUEST", "GetLegendGraphic")
            .append_pair("FORMAT", "image/png")
            .append_pair("LAYER", &self.endpoints.qualified(layer))
            .append_pair("STYLE", style)
            .append_pair("_t", &cache_bust.to_string());
        Ok(url)
    }

    // ── Requests ─────────────────────────────────────────────────────

    pub async fn get_feature(
        &self,
        type_name: &str,
        cql_filter: Option<&str>,
        max_features: Option<u32>,
    ) -> Result<FeatureCollection, Error> {
        let url = self.get_feature_url(type_name, cql_filter, max_features)?;
        self.get_json("WFS", url).await
    }

    pub async fn get_feature_info(
        &self,
        layer: &str,
        req: &FeatureInfoRequest,
    ) -> Result<FeatureCollection, Error> {
        let url = self.feature_info_url(layer, req)?;
        self.get_json("GetFeatureInfo", url).await
    }

    /// Probe the REST version endpoint with the fixed health-check deadline.
    pub async fn check_health(&self) -> Result<(), Error> {
        let url = self.endpoints.health_url()?;
        trace!("health probe {}", url);
        with_deadline("Health check", HEALTH_CHECK_TIMEOUT, async {
            let resp = self
                .request(url)
                .header(ACCEPT, "application/json")
                .send()
                .await?;
            let status = resp.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(Error::Http {
                    service: "Health check",
                    status: status.as_u16(),
                })
            }
        })
        .await
    }

    /// Fetch a legend graphic and confirm it decodes as an image response.
    ///
    /// Deadline overruns keep their timeout identity; every other failure is
    /// reported as [`Error::LegendImage`].
    pub async fn preload_legend(&self, url: &Url) -> Result<(), Error> {
        match self.preload_image(url).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_timeout() => Err(e),
            Err(e) => {
                debug!(error = %e, "legend preload failed");
                Err(Error::LegendImage)
            }
        }
    }

    /// GET an image URL and require a successful `image/*` response.
    pub async fn preload_image(&self, url: &Url) -> Result<(), Error> {
        debug!("GET {} (preload)", url);
        with_deadline("Image", self.transport.timeout, async {
            let resp = self.request(url.clone()).send().await?;
            let is_image = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.starts_with("image/"));
            if !resp.status().is_success() || !is_image {
                return Err(Error::ImageLoad {
                    url: url.to_string(),
                });
            }
            resp.bytes().await?;
            Ok(())
        })
        .await
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        self.transport.authorize(self.http.get(url))
    }

    /// Send a GET request, enforce the deadline, and decode a JSON body.
    async fn get_json<T: DeserializeOwned>(&self, service: &'static str, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        with_deadline(service, self.transport.timeout, async {
            let resp = self.request(url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(Error::Http {
                    service,
                    status: status.as_u16(),
                });
            }
            let body = resp.text().await?;
            decode_json(&body)
        })
        .await
    }
}

/// Race a request future against its deadline. Dropping the future on
/// expiry aborts the in-flight connection; the timer is dropped either way.
pub(crate) async fn with_deadline<T>(
    service: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    if let Ok(result) = tokio::time::timeout(timeout, fut).await {
        result
    } else {
        debug!(service, timeout_ms = millis(timeout), "request deadline exceeded");
        Err(Error::Timeout {
            service,
            timeout_ms: millis(timeout),
        })
    }
}

pub(crate) fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(PREVIEW_CHARS).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.to_owned(),
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> GeoServerClient {
        let endpoints = Endpoints::new(
            Url::parse("http://gs.example.org/geoserver/").unwrap(),
            "SZEB_sample",
        );
        GeoServerClient::with_client(
            reqwest::Client::new(),
            endpoints,
            TransportConfig::default(),
        )
    }

    #[test]
    fn endpoints_trim_trailing_slash() {
        let c = client();
        assert_eq!(
            c.endpoints().wms_url().unwrap().as_str(),
            "http://gs.example.org/geoserver/SZEB_sample/wms"
        );
        assert_eq!(
            c.endpoints().health_url().unwrap().as_str(),
            "http://gs.example.org/geoserver/rest/about/version.json"
        );
    }

    #[test]
    fn get_feature_url_with_filter_and_count() {
        let url = c_url(|c| c.get_feature_url("szeb_psme_vector", Some("OBJECTID=17"), Some(5)));
        insta::assert_snapshot!(url, @"http://gs.example.org/geoserver/SZEB_sample/wfs?service=WFS&version=2.0.0&request=GetFeature&typeName=SZEB_sample%3Aszeb_psme_vector&outputFormat=application%2Fjson&cql_filter=OBJECTID%3D17&count=5");
    }

    #[test]
    fn get_feature_url_omits_empty_filter() {
        let url = c_url(|c| c.get_feature_url("roads", Some(""), None));
        assert!(!url.contains("cql_filter"));
        assert!(!url.contains("count="));
    }

    #[test]
    fn legend_url_carries_style_and_cache_bust() {
        let url = c_url(|c| c.legend_url("SZEBxPsme_raster_4326", "SZEBxPsme_raster_4326_range", 1_700_000_000_000));
        insta::assert_snapshot!(url, @"http://gs.example.org/geoserver/wms?REQUEST=GetLegendGraphic&FORMAT=image%2Fpng&LAYER=SZEB_sample%3ASZEBxPsme_raster_4326&STYLE=SZEBxPsme_raster_4326_range&_t=1700000000000");
    }

    #[test]
    fn feature_info_url_includes_env_and_pixel() {
        let req = FeatureInfoRequest {
            bbox: BoundingBox::new(-124.0, 36.0, -120.0, 40.0),
            width: 800,
            height: 600,
            x: 400,
            y: 300,
            feature_count: 1,
            styles: None,
            env: Some("addAttributeTable:true".into()),
        };
        let url = c_url(|c| c.feature_info_url("SZEBxPsme_raster_4326", &req));
        assert!(url.contains("REQUEST=GetFeatureInfo"));
        assert!(url.contains("BBOX=-124%2C36%2C-120%2C40"));
        assert!(url.contains("X=400&Y=300"));
        assert!(url.contains("SRS=EPSG%3A4326"));
        assert!(url.contains("ENV=addAttributeTable%3Atrue"));
        assert!(!url.contains("STYLES="));
    }

    fn c_url(f: impl FnOnce(&GeoServerClient) -> Result<Url, Error>) -> String {
        f(&client()).unwrap().to_string()
    }
}
