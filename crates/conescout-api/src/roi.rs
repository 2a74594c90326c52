// Region-of-interest endpoints on the application server.
//
// Plain REST calls with a deadline; no retry or caching.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::geo::BoundingBox;
use crate::geoserver::{decode_json, with_deadline};
use crate::transport::TransportConfig;

#[derive(Debug, Deserialize)]
struct HasRoiResponse {
    #[serde(default)]
    has_roi: bool,
}

#[derive(Debug, Deserialize)]
struct GetRoiResponse {
    #[serde(default)]
    status: String,
    /// GeoJSON serialized as a string.
    #[serde(default)]
    geojson: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the `/has_roi`, `/get_roi`, and download endpoints.
#[derive(Debug, Clone)]
pub struct RoiClient {
    http: reqwest::Client,
    base_url: Url,
    transport: TransportConfig,
}

impl RoiClient {
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url,
            transport: transport.clone(),
        })
    }

    pub fn with_client(http: reqwest::Client, base_url: Url, transport: TransportConfig) -> Self {
        Self {
            http,
            base_url,
            transport,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// Whether the server holds an uploaded ROI. Any failure reads as `false`.
    pub async fn has_roi(&self) -> bool {
        match self.fetch_has_roi().await {
            Ok(flag) => flag,
            Err(e) => {
                warn!(error = %e, "ROI existence check failed");
                false
            }
        }
    }

    async fn fetch_has_roi(&self) -> Result<bool, Error> {
        let url = self.endpoint("has_roi")?;
        let resp: HasRoiResponse = self.get_json(url).await?;
        Ok(resp.has_roi)
    }

    /// Fetch the stored ROI geometry as a GeoJSON value.
    pub async fn get_roi(&self) -> Result<Value, Error> {
        let url = self.endpoint("get_roi")?;
        let resp: GetRoiResponse = self.get_json(url).await?;
        if resp.status != "success" {
            return Err(Error::Roi {
                message: resp
                    .message
                    .unwrap_or_else(|| "Failed to retrieve ROI".into()),
            });
        }
        let raw = resp.geojson.ok_or_else(|| Error::Roi {
            message: "response carried no geometry".into(),
        })?;
        decode_json(&raw)
    }

    /// Download link for the ROI intersected with a vector table.
    pub fn vector_download_url(&self, vector_table: &str) -> Result<Url, Error> {
        let mut url = self.endpoint("download_roi_intersection")?;
        url.query_pairs_mut().append_pair("vector", vector_table);
        Ok(url)
    }

    /// Download link for a vector table clipped to the visible extent.
    pub fn current_view_download_url(
        &self,
        vector_table: &str,
        bounds: &BoundingBox,
    ) -> Result<Url, Error> {
        let mut url = self.endpoint("download_map_view")?;
        url.query_pairs_mut()
            .append_pair("vector", vector_table)
            .append_pair("bbox", &bounds.to_bbox_string());
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        with_deadline("ROI", self.transport.timeout, async {
            let resp = self.transport.authorize(self.http.get(url)).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(Error::Http {
                    service: "ROI",
                    status: status.as_u16(),
                });
            }
            let body = resp.text().await?;
            decode_json(&body)
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> RoiClient {
        RoiClient::with_client(
            reqwest::Client::new(),
            Url::parse("http://app.example.org/").unwrap(),
            TransportConfig::default(),
        )
    }

    #[test]
    fn download_urls_encode_parameters() {
        let c = client();
        assert_eq!(
            c.vector_download_url("szeb psme").unwrap().as_str(),
            "http://app.example.org/download_roi_intersection?vector=szeb+psme"
        );
        let bbox = BoundingBox::new(-122.5, 38.0, -121.0, 39.5);
        assert_eq!(
            c.current_view_download_url("roads", &bbox).unwrap().as_str(),
            "http://app.example.org/download_map_view?vector=roads&bbox=-122.5%2C38%2C-121%2C39.5"
        );
    }
}
