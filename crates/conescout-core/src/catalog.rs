// ── Species catalog ──
//
// Data-only description of each species: its GeoServer layers, sidebar
// image, and the attribute menu grouped into sections. Order is
// significant everywhere (menu order, default species).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A titled group of attributes in the menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSection {
    pub label: String,
    /// Attribute key -> display label.
    pub items: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Species {
    pub display_name: String,
    pub scientific_name: String,
    pub vector_layer: String,
    pub raster_layer: String,
    #[serde(default)]
    pub background_image: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Section key -> section.
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeSection>,
}

fn enabled_by_default() -> bool {
    true
}

impl Species {
    /// Whether `attribute` appears in any section.
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes
            .values()
            .any(|section| section.items.contains_key(attribute))
    }

    /// Display label for an attribute key.
    pub fn attribute_label(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .values()
            .find_map(|section| section.items.get(attribute))
            .map(String::as_str)
    }

    /// First attribute in menu order.
    pub fn first_attribute(&self) -> Option<&str> {
        self.attributes
            .values()
            .flat_map(|section| section.items.keys())
            .next()
            .map(String::as_str)
    }
}

/// Ordered set of species keyed by short id (`psme`, `pipo`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesCatalog {
    #[serde(default)]
    species: IndexMap<String, Species>,
}

impl SpeciesCatalog {
    pub fn new(species: IndexMap<String, Species>) -> Self {
        Self { species }
    }

    /// The species shipped with the tool.
    pub fn builtin() -> Self {
        let mut species = IndexMap::new();
        species.insert(
            "psme".to_owned(),
            builtin_species(
                "Douglas Fir",
                "Pseudotsuga menziesii",
                "psme",
                "Psme",
                "/static/images/DouglasFirCones1_Tom-BrandtCC-BY-ND-2.jpg",
                true,
            ),
        );
        species.insert(
            "pipo".to_owned(),
            builtin_species(
                "Ponderosa Pine",
                "Pinus ponderosa",
                "pipo",
                "Pipo",
                "/static/images/lake-tahoe-trees-ponderosa.jpg",
                true,
            ),
        );
        // Disabled until its GeoServer layers are published.
        species.insert(
            "pila".to_owned(),
            builtin_species(
                "Sugar Pine",
                "Pinus lambertiana",
                "pila",
                "Pila",
                "/static/images/sugar-pine.jpg",
                false,
            ),
        );
        Self { species }
    }

    /// Parse a catalog from TOML (`[species.<id>]` tables).
    pub fn from_toml_str(source: &str) -> Result<Self, CoreError> {
        let catalog: Self = toml::from_str(source).map_err(|e| CoreError::Config {
            message: format!("invalid species catalog: {e}"),
        })?;
        Ok(catalog)
    }

    pub fn get_species(&self, id: &str) -> Option<&Species> {
        self.species.get(id)
    }

    /// Like [`get_species`](Self::get_species) but fails with `SpeciesNotFound`.
    pub fn require(&self, id: &str) -> Result<&Species, CoreError> {
        self.get_species(id).ok_or_else(|| CoreError::SpeciesNotFound { id: id.to_owned() })
    }

    pub fn all(&self) -> impl Iterator<Item = (&str, &Species)> {
        self.species.iter().map(|(id, s)| (id.as_str(), s))
    }

    /// Enabled species in catalog order.
    pub fn enabled_species(&self) -> impl Iterator<Item = (&str, &Species)> {
        self.all().filter(|(_, s)| s.enabled)
    }

    /// First enabled species.
    pub fn default_species_id(&self) -> Option<&str> {
        self.enabled_species().next().map(|(id, _)| id)
    }

    pub fn species_for_raster_layer(&self, raster_layer: &str) -> Option<&str> {
        self.all()
            .find(|(_, s)| s.raster_layer == raster_layer)
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }
}

fn builtin_species(
    display_name: &str,
    scientific_name: &str,
    id: &str,
    raster_code: &str,
    background_image: &str,
    enabled: bool,
) -> Species {
    Species {
        display_name: display_name.into(),
        scientific_name: scientific_name.into(),
        vector_layer: format!("szeb_{id}_vector"),
        raster_layer: format!("SZEBx{raster_code}_raster_4326"),
        background_image: Some(background_image.into()),
        enabled,
        attributes: standard_attributes(),
    }
}

fn section(label: &str, items: &[(&str, &str)]) -> AttributeSection {
    AttributeSection {
        label: label.into(),
        items: items
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
    }
}

fn standard_attributes() -> IndexMap<String, AttributeSection> {
    let mut sections = IndexMap::new();
    sections.insert(
        "basics".to_owned(),
        section(
            "Basic Information",
            &[
                ("Range", "Range"),
                ("TotalSZEBRanking", "Total SZEB Rank"),
                ("roads_mi", "Roads in Range/SZEB (mi)"),
                ("range_area_km2", "Range Area (ac)"),
            ],
        ),
    );
    sections.insert(
        "risks".to_owned(),
        section(
            "Risk Factors",
            &[
                ("ClimateExposureRiskCat", "Climate Exposure Risk"),
                ("FireIntensityRiskCat", "Fire Intensity Risk"),
                ("CombinedRiskCategory", "Combined Risk"),
            ],
        ),
    );
    sections.insert(
        "operations".to_owned(),
        section(
            "Operational Factors",
            &[
                ("LandownerDemandCat", "Landowner Demand"),
                ("ProjectedDemandCat", "Projected Demand"),
                ("CurrentSupplyCat", "Current Supply"),
                ("OperationalPriorityCategory", "Combined Op. Priority"),
            ],
        ),
    );
    sections
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn builtin_defaults_to_first_enabled() {
        let catalog = SpeciesCatalog::builtin();
        assert_eq!(catalog.default_species_id(), Some("psme"));
        let enabled: Vec<_> = catalog.enabled_species().map(|(id, _)| id).collect();
        assert_eq!(enabled, vec!["psme", "pipo"]);

        let psme = catalog.get_species("psme").unwrap();
        assert_eq!(psme.raster_layer, "SZEBxPsme_raster_4326");
        assert_eq!(psme.vector_layer, "szeb_psme_vector");
        assert_eq!(psme.first_attribute(), Some("Range"));
        assert_eq!(psme.attribute_label("CombinedRiskCategory"), Some("Combined Risk"));
    }

    #[test]
    fn raster_layer_maps_back_to_species() {
        let catalog = SpeciesCatalog::builtin();
        assert_eq!(catalog.species_for_raster_layer("SZEBxPipo_raster_4326"), Some("pipo"));
        assert_eq!(catalog.species_for_raster_layer("nope"), None);
        assert!(matches!(
            catalog.require("abco"),
            Err(CoreError::SpeciesNotFound { .. })
        ));
    }

    #[test]
    fn toml_catalog_keeps_document_order() {
        let catalog = SpeciesCatalog::from_toml_str(
            r#"
            [species.abco]
            display_name = "White Fir"
            scientific_name = "Abies concolor"
            vector_layer = "szeb_abco_vector"
            raster_layer = "SZEBxAbco_raster_4326"

            [species.abco.attributes.risks]
            label = "Risk Factors"
            items = { FireIntensityRiskCat = "Fire Intensity Risk", Range = "Range" }

            [species.cade]
            display_name = "Incense Cedar"
            scientific_name = "Calocedrus decurrens"
            vector_layer = "szeb_cade_vector"
            raster_layer = "SZEBxCade_raster_4326"
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.default_species_id(), Some("abco"));
        let abco = catalog.get_species("abco").unwrap();
        assert_eq!(abco.first_attribute(), Some("FireIntensityRiskCat"));
        assert_eq!(abco.background_image, None);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = SpeciesCatalog::from_toml_str("[species.x]\ndisplay_name = 3").unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }
}
