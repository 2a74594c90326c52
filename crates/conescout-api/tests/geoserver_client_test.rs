#![allow(clippy::unwrap_used)]
// Integration tests for `GeoServerClient` and `RoiClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conescout_api::{
    BoundingBox, Endpoints, Error, FeatureInfoRequest, GeoServerClient, RoiClient, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup_with(transport: TransportConfig) -> (MockServer, GeoServerClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/geoserver", server.uri())).unwrap();
    let client = GeoServerClient::with_client(
        reqwest::Client::new(),
        Endpoints::new(base_url, "SZEB_sample"),
        transport,
    );
    (server, client)
}

async fn setup() -> (MockServer, GeoServerClient) {
    setup_with(TransportConfig::default()).await
}

fn png() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png")
}

fn feature_info_request() -> FeatureInfoRequest {
    FeatureInfoRequest {
        bbox: BoundingBox::new(-124.0, 36.0, -120.0, 40.0),
        width: 800,
        height: 600,
        x: 120,
        y: 80,
        feature_count: 1,
        styles: None,
        env: Some("addAttributeTable:true".into()),
    }
}

// ── WFS GetFeature ──────────────────────────────────────────────────

#[tokio::test]
async fn test_get_feature_sends_qualified_type_and_filter() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/geoserver/SZEB_sample/wfs"))
        .and(query_param("request", "GetFeature"))
        .and(query_param("typeName", "SZEB_sample:szebs_raw_boundaries_4326"))
        .and(query_param("cql_filter", "INTERSECTS(the_geom, POINT(-121.5 38.2))"))
        .and(query_param("outputFormat", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "id": "szebs.7",
                "geometry": { "type": "Point", "coordinates": [-121.5, 38.2] },
                "properties": { "SZEB": "261_5" }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fc = client
        .get_feature(
            "szebs_raw_boundaries_4326",
            Some("INTERSECTS(the_geom, POINT(-121.5 38.2))"),
            None,
        )
        .await
        .unwrap();

    assert_eq!(fc.features.len(), 1);
    assert_eq!(fc.features[0].property("SZEB"), Some(&json!("261_5")));
}

#[tokio::test]
async fn test_get_feature_status_error_names_service() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/geoserver/SZEB_sample/wfs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client.get_feature("roads_ca_4326", None, None).await.unwrap_err();

    assert!(matches!(err, Error::Http { status: 500, .. }));
    assert_eq!(err.to_string(), "WFS request failed with status: 500");
    assert!(!err.is_timeout());
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_get_feature_timeout_is_distinct() {
    let (server, client) =
        setup_with(TransportConfig::default().with_timeout(Duration::from_millis(100))).await;

    Mock::given(method("GET"))
        .and(path("/geoserver/SZEB_sample/wfs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({ "type": "FeatureCollection", "features": [] })),
        )
        .mount(&server)
        .await;

    let err = client.get_feature("roads_ca_4326", None, None).await.unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got: {err:?}");
    assert_eq!(err.to_string(), "WFS request timed out after 100ms");
}

#[tokio::test]
async fn test_get_feature_malformed_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/geoserver/SZEB_sample/wfs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ServiceExceptionReport/>"))
        .mount(&server)
        .await;

    let err = client.get_feature("roads_ca_4326", None, None).await.unwrap_err();

    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "<ServiceExceptionReport/>"),
        other => panic!("expected Deserialization error, got: {other:?}"),
    }
}

// ── WMS GetFeatureInfo ──────────────────────────────────────────────

#[tokio::test]
async fn test_get_feature_info_params() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/geoserver/SZEB_sample/wms"))
        .and(query_param("REQUEST", "GetFeatureInfo"))
        .and(query_param("VERSION", "1.1.1"))
        .and(query_param("QUERY_LAYERS", "SZEB_sample:SZEBxPsme_raster_4326"))
        .and(query_param("BBOX", "-124,36,-120,40"))
        .and(query_param("X", "120"))
        .and(query_param("Y", "80"))
        .and(query_param("INFO_FORMAT", "application/json"))
        .and(query_param("ENV", "addAttributeTable:true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "FeatureCollection",
            "features": [{ "type": "Feature", "properties": { "GRAY_INDEX": 12 } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fc = client
        .get_feature_info("SZEBxPsme_raster_4326", &feature_info_request())
        .await
        .unwrap();

    assert_eq!(fc.first().unwrap().property("GRAY_INDEX"), Some(&json!(12)));
}

#[tokio::test]
async fn test_get_feature_info_status_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/geoserver/SZEB_sample/wms"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client
        .get_feature_info("SZEBxPsme_raster_4326", &feature_info_request())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "GetFeatureInfo request failed with status: 404");
    assert!(!err.is_transient());
}

// ── Health ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_check_health_ok() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/geoserver/rest/about/version.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "about": {} })))
        .expect(1)
        .mount(&server)
        .await;

    client.check_health().await.unwrap();
}

#[tokio::test]
async fn test_check_health_failure_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/geoserver/rest/about/version.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.check_health().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_basic_auth_is_attached() {
    let transport = TransportConfig::default().with_auth("admin", "geoserver".to_string().into());
    let (server, client) = setup_with(transport).await;

    Mock::given(method("GET"))
        .and(path("/geoserver/rest/about/version.json"))
        .and(basic_auth("admin", "geoserver"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.check_health().await.unwrap();
}

// ── Legend / image preload ──────────────────────────────────────────

#[tokio::test]
async fn test_preload_legend_success() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/geoserver/wms"))
        .and(query_param("REQUEST", "GetLegendGraphic"))
        .and(query_param("STYLE", "SZEBxPsme_raster_4326_range"))
        .respond_with(png())
        .expect(1)
        .mount(&server)
        .await;

    let url = client
        .legend_url("SZEBxPsme_raster_4326", "SZEBxPsme_raster_4326_range", 1)
        .unwrap();
    client.preload_legend(&url).await.unwrap();
}

#[tokio::test]
async fn test_preload_legend_non_image_is_legend_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/geoserver/wms"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ServiceExceptionReport/>"))
        .mount(&server)
        .await;

    let url = client.legend_url("SZEBxPsme_raster_4326", "missing_style", 1).unwrap();
    let err = client.preload_legend(&url).await.unwrap_err();

    assert!(matches!(err, Error::LegendImage));
    assert_eq!(err.to_string(), "Failed to load legend image");
}

#[tokio::test]
async fn test_preload_image_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/static/images/psme.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/static/images/psme.jpg", server.uri())).unwrap();
    let err = client.preload_image(&url).await.unwrap_err();

    assert!(matches!(err, Error::ImageLoad { .. }));
}

// ── ROI ─────────────────────────────────────────────────────────────

async fn roi_setup() -> (MockServer, RoiClient) {
    let server = MockServer::start().await;
    let client = RoiClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        TransportConfig::default(),
    );
    (server, client)
}

#[tokio::test]
async fn test_has_roi_true() {
    let (server, client) = roi_setup().await;

    Mock::given(method("GET"))
        .and(path("/has_roi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "has_roi": true })))
        .mount(&server)
        .await;

    assert!(client.has_roi().await);
}

#[tokio::test]
async fn test_has_roi_errors_read_as_false() {
    let (server, client) = roi_setup().await;

    Mock::given(method("GET"))
        .and(path("/has_roi"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(!client.has_roi().await);
}

#[tokio::test]
async fn test_get_roi_decodes_embedded_geojson() {
    let (server, client) = roi_setup().await;

    let geojson = json!({ "type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]] });
    Mock::given(method("GET"))
        .and(path("/get_roi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "geojson": geojson.to_string()
        })))
        .mount(&server)
        .await;

    let roi = client.get_roi().await.unwrap();
    assert_eq!(roi, geojson);
}

#[tokio::test]
async fn test_get_roi_failure_message() {
    let (server, client) = roi_setup().await;

    Mock::given(method("GET"))
        .and(path("/get_roi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "message": "No ROI uploaded"
        })))
        .mount(&server)
        .await;

    let err = client.get_roi().await.unwrap_err();
    assert_eq!(err.to_string(), "ROI request failed: No ROI uploaded");
}
