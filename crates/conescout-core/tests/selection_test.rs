#![allow(clippy::unwrap_used)]
// Integration tests for `SelectionController`: menu rebuilds, legend
// visibility, sidebar images, and race resolution between selections.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conescout_core::map::RASTER_PANE;
use conescout_core::{
    ConnectionConfig, ConnectionManager, CoreError, InMemorySurface, LegendView, MapSession, MapSurface,
    RefreshOutcome, SelectionController, SpeciesCatalog,
};

const PSME_TOP10: &str = "SZEBxPsme_raster_4326_b0_TotalSZEBRanking_top10";

// ── Helpers ─────────────────────────────────────────────────────────

struct Harness {
    server: MockServer,
    surface: Arc<InMemorySurface>,
    controller: SelectionController,
}

async fn setup() -> Harness {
    let server = MockServer::start().await;
    let config =
        ConnectionConfig::parse(&format!("{}/geoserver", server.uri()), "SZEB_sample").unwrap();
    let connection = ConnectionManager::new(config).unwrap();
    let surface = Arc::new(InMemorySurface::new());
    let session = MapSession::new(connection, surface.clone());
    let controller = SelectionController::new(session, Arc::new(SpeciesCatalog::builtin()));
    Harness {
        server,
        surface,
        controller,
    }
}

fn png() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png")
}

async fn mount_legends(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/geoserver/wms"))
        .and(query_param("REQUEST", "GetLegendGraphic"))
        .respond_with(png())
        .mount(server)
        .await;
}

fn legend_url(legend: &LegendView) -> &Url {
    match legend {
        LegendView::Image { url } => url,
        other => panic!("expected a legend image, got {other:?}"),
    }
}

// ── Initialization ──────────────────────────────────────────────────

#[tokio::test]
async fn test_initialize_selects_default_species_with_range() {
    let h = setup().await;

    let outcome = h.controller.initialize().await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Applied);
    let display = h.controller.display();
    assert_eq!(display.species_id.as_deref(), Some("psme"));
    assert_eq!(display.attribute.as_deref(), Some("Range"));
    assert_eq!(display.style.as_deref(), Some("SZEBxPsme_raster_4326_range"));
    // Range hides the legend without asking the server.
    assert_eq!(display.legend, LegendView::Hidden);
    assert!(h.server.received_requests().await.unwrap().is_empty());
    assert_eq!(
        display.sidebar_background.as_deref(),
        Some("/static/images/DouglasFirCones1_Tom-BrandtCC-BY-ND-2.jpg")
    );
    assert_eq!(h.surface.layers_in_pane(RASTER_PANE).len(), 1);
}

#[tokio::test]
async fn test_initialize_without_enabled_species_fails() {
    let h = setup().await;
    let catalog = SpeciesCatalog::from_toml_str(
        r#"
        [species.pila]
        display_name = "Sugar Pine"
        scientific_name = "Pinus lambertiana"
        vector_layer = "szeb_pila_vector"
        raster_layer = "SZEBxPila_raster_4326"
        enabled = false
        "#,
    )
    .unwrap();
    let controller = SelectionController::new(h.controller.session().clone(), Arc::new(catalog));

    let err = controller.initialize().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Configuration error: No enabled species found in configuration"
    );
}

// ── End to end ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_douglas_fir_top_ten_ranking() {
    let h = setup().await;
    Mock::given(method("GET"))
        .and(path("/geoserver/wms"))
        .and(query_param("STYLE", PSME_TOP10))
        .and(query_param("LAYER", "SZEB_sample:SZEBxPsme_raster_4326"))
        .respond_with(png())
        .expect(1)
        .with_priority(1)
        .mount(&h.server)
        .await;
    mount_legends(&h.server).await;

    h.controller.initialize().await.unwrap();
    h.controller.handle_attribute_change("TotalSZEBRanking").await.unwrap();
    h.controller.handle_top_ten_change(true).await.unwrap();

    let display = h.controller.display();
    assert_eq!(display.style.as_deref(), Some(PSME_TOP10));
    assert!(display.top_ten_only);
    assert!(legend_url(&display.legend).as_str().contains(PSME_TOP10));

    let session = h.controller.session();
    let current = session.current_layer().await.unwrap();
    assert_eq!(current.style(), Some(PSME_TOP10));
    assert!(
        session
            .connection()
            .is_cached(&format!("legend_SZEBxPsme_raster_4326_{PSME_TOP10}"))
    );
    assert_eq!(h.surface.peak_layers_in_pane(RASTER_PANE), 1);
}

#[tokio::test]
async fn test_top_ten_only_changes_ranking_style() {
    let h = setup().await;
    mount_legends(&h.server).await;
    h.controller.initialize().await.unwrap();
    h.controller.handle_attribute_change("FireIntensityRiskCat").await.unwrap();

    h.controller.handle_top_ten_change(true).await.unwrap();

    assert_eq!(
        h.controller.display().style.as_deref(),
        Some("SZEBxPsme_raster_4326_b0_FireIntensityRiskCat")
    );
}

// ── Attribute menu ──────────────────────────────────────────────────

#[tokio::test]
async fn test_species_change_keeps_shared_attribute() {
    let h = setup().await;
    mount_legends(&h.server).await;
    h.controller.initialize().await.unwrap();
    h.controller.handle_attribute_change("CombinedRiskCategory").await.unwrap();

    h.controller.handle_species_change("pipo").await.unwrap();

    let selection = h.controller.selection();
    assert_eq!(selection.species_id.as_deref(), Some("pipo"));
    assert_eq!(selection.attribute.as_deref(), Some("CombinedRiskCategory"));
    assert_eq!(
        h.controller.display().style.as_deref(),
        Some("SZEBxPipo_raster_4326_b0_CombinedRiskCategory")
    );
}

#[tokio::test]
async fn test_species_change_falls_back_to_first_option() {
    let h = setup().await;
    mount_legends(&h.server).await;
    let catalog = SpeciesCatalog::from_toml_str(
        r#"
        [species.psme]
        display_name = "Douglas Fir"
        scientific_name = "Pseudotsuga menziesii"
        vector_layer = "szeb_psme_vector"
        raster_layer = "SZEBxPsme_raster_4326"
        [species.psme.attributes.basics]
        label = "Basic Information"
        items = { Range = "Range", roads_mi = "Roads in Range/SZEB (mi)" }

        [species.abco]
        display_name = "White Fir"
        scientific_name = "Abies concolor"
        vector_layer = "szeb_abco_vector"
        raster_layer = "SZEBxAbco_raster_4326"
        [species.abco.attributes.risks]
        label = "Risk Factors"
        items = { FireIntensityRiskCat = "Fire Intensity Risk" }
        "#,
    )
    .unwrap();
    let controller = SelectionController::new(h.controller.session().clone(), Arc::new(catalog));
    controller.initialize().await.unwrap();
    controller.handle_attribute_change("roads_mi").await.unwrap();

    controller.handle_species_change("abco").await.unwrap();

    assert_eq!(
        controller.selection().attribute.as_deref(),
        Some("FireIntensityRiskCat")
    );
    assert_eq!(controller.display().sidebar_background, None);
}

#[tokio::test]
async fn test_unknown_attribute_and_species_are_rejected() {
    let h = setup().await;
    h.controller.initialize().await.unwrap();

    let err = h.controller.handle_attribute_change("Risk Factors").await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownAttribute { .. }));
    let err = h.controller.handle_species_change("abco").await.unwrap_err();
    assert!(matches!(err, CoreError::SpeciesNotFound { .. }));

    // Neither failure disturbed the selection.
    assert_eq!(h.controller.selection().attribute.as_deref(), Some("Range"));
    assert_eq!(h.controller.selection().species_id.as_deref(), Some("psme"));
}

// ── Races ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_slow_earlier_selection_never_overwrites_later_one() {
    let h = setup().await;
    // Douglas Fir legends are slow, Ponderosa Pine legends are instant.
    Mock::given(method("GET"))
        .and(path("/geoserver/wms"))
        .and(query_param("LAYER", "SZEB_sample:SZEBxPsme_raster_4326"))
        .respond_with(png().set_delay(Duration::from_millis(500)))
        .with_priority(1)
        .mount(&h.server)
        .await;
    mount_legends(&h.server).await;

    h.controller.initialize().await.unwrap();
    h.controller.handle_species_change("pipo").await.unwrap();
    h.controller.handle_attribute_change("TotalSZEBRanking").await.unwrap();

    let slow = {
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.handle_species_change("psme").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let fast = h.controller.handle_species_change("pipo").await.unwrap();

    assert_eq!(fast, RefreshOutcome::Applied);
    assert_eq!(slow.await.unwrap().unwrap(), RefreshOutcome::Superseded);

    let display = h.controller.display();
    assert_eq!(display.species_id.as_deref(), Some("pipo"));
    assert_eq!(
        display.style.as_deref(),
        Some("SZEBxPipo_raster_4326_b0_TotalSZEBRanking")
    );
    assert!(legend_url(&display.legend).as_str().contains("SZEBxPipo_raster_4326"));

    let current = h.controller.session().current_layer().await.unwrap();
    assert_eq!(current.layer_name(), "SZEBxPipo_raster_4326");
    assert_eq!(h.surface.peak_layers_in_pane(RASTER_PANE), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_species_change_keeps_attribute_chosen_while_in_flight() {
    let h = setup().await;
    mount_legends(&h.server).await;
    h.controller.initialize().await.unwrap();

    let (attribute, species) = tokio::join!(
        h.controller.handle_attribute_change("CombinedRiskCategory"),
        h.controller.handle_species_change("pipo"),
    );

    attribute.unwrap();
    assert_eq!(species.unwrap(), RefreshOutcome::Applied);
    let display = h.controller.display();
    assert_eq!(display.species_id.as_deref(), Some("pipo"));
    assert_eq!(display.attribute.as_deref(), Some("CombinedRiskCategory"));
}

#[tokio::test]
async fn test_back_to_back_changes_settle_on_last() {
    let h = setup().await;
    mount_legends(&h.server).await;
    h.controller.initialize().await.unwrap();

    let changes = ["pipo", "psme", "pipo", "psme"].map(|id| {
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.handle_species_change(id).await })
    });
    let mut outcomes = Vec::new();
    for change in changes {
        outcomes.push(change.await.unwrap().unwrap());
    }

    let display = h.controller.display();
    assert_eq!(display.species_id, h.controller.selection().species_id);
    assert!(outcomes.contains(&RefreshOutcome::Applied));
    assert_eq!(h.surface.layers_in_pane(RASTER_PANE).len(), 1);
}
