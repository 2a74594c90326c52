// ── Attribute table presentation ──
//
// Pure formatting of vector feature properties for the info panel.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::catalog::Species;

const KM2_TO_ACRES: f64 = 247.105;
const KM_TO_MI: f64 = 0.621_371;

/// Attributes shown verbatim: their numbers are category codes, not measures.
const CATEGORY_ATTRIBUTES: [&str; 8] = [
    "TotalSZEBRanking",
    "ClimateExposureRiskCat",
    "FireIntensityRiskCat",
    "CombinedRiskCategory",
    "LandownerDemandCat",
    "ProjectedDemandCat",
    "CurrentSupplyCat",
    "OperationalPriorityCategory",
];

/// Render one attribute value for display.
///
/// `null` renders empty and non-numbers render as text. Numbers are
/// formatted by attribute: `range_area_km2` as whole acres, road lengths
/// rounded, category codes verbatim, anything else to two decimals.
pub fn format_attribute_value(value: &Value, attribute: &str) -> String {
    let number = match value {
        Value::Null => return String::new(),
        Value::String(s) => return s.clone(),
        Value::Number(n) => n.as_f64(),
        other => return other.to_string(),
    };
    let Some(number) = number.filter(|n| n.is_finite()) else {
        return value.to_string();
    };

    match attribute {
        "roads_mi" | "roads_km" => plain_number(number.round()),
        "range_area_km2" => group_thousands(&plain_number((number * KM2_TO_ACRES).round())),
        a if CATEGORY_ATTRIBUTES.contains(&a) => plain_number(number),
        _ => group_thousands(&two_decimals(number)),
    }
}

/// Split a `SZEB` code (`<seed zone>_<elevation band>`) into its parts.
pub fn parse_szeb(szeb: &str) -> (String, String) {
    let mut parts = szeb.split('_');
    let seed_zone = parts.next().unwrap_or_default().trim().to_owned();
    let elevation_band = parts.next().unwrap_or_default().trim().to_owned();
    (seed_zone, elevation_band)
}

/// Fill in derived properties: `roads_mi` from `roads_km` when missing.
pub fn process_feature_properties(properties: &Map<String, Value>) -> Map<String, Value> {
    let mut processed = properties.clone();
    if !properties.contains_key("roads_mi") {
        if let Some(km) = properties.get("roads_km").and_then(Value::as_f64) {
            if let Some(mi) = serde_json::Number::from_f64(km * KM_TO_MI) {
                processed.insert("roads_mi".into(), Value::Number(mi));
            }
        }
    }
    processed
}

// ── AttributeTable ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeColumn {
    pub key: &'static str,
    pub header: &'static str,
    pub value: String,
}

/// A single-row summary table for one seed zone / elevation band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeTable {
    pub title: String,
    pub scientific_name: String,
    pub columns: Vec<AttributeColumn>,
}

impl AttributeTable {
    pub fn build(properties: &Map<String, Value>, species: &Species) -> Self {
        let props = process_feature_properties(properties);
        let (seed_zone, elevation_band) =
            parse_szeb(props.get("SZEB").and_then(Value::as_str).unwrap_or_default());

        let field = |key: &'static str| {
            props
                .get(key)
                .map(|v| format_attribute_value(v, key))
                .unwrap_or_default()
        };
        let roads = props
            .get("roads_mi")
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite())
            .map(|n| plain_number(n.round()))
            .unwrap_or_default();

        let columns = vec![
            column("SZEB_seed", "Seed Zone", seed_zone),
            column("SZEB_elev", "Elevation Band", elevation_band),
            column("TotalSZEBRanking", "Total SZEB Rank", field("TotalSZEBRanking")),
            column("CombinedRiskCategory", "Combined Risk", field("CombinedRiskCategory")),
            column(
                "ClimateExposureRiskCat",
                "Climate Exposure Risk",
                field("ClimateExposureRiskCat"),
            ),
            column("FireIntensityRiskCat", "Fire Intensity Risk", field("FireIntensityRiskCat")),
            column("roads_mi", "Roads (mi)", roads),
        ];

        Self {
            title: format!("{} Attributes", species.display_name),
            scientific_name: species.scientific_name.clone(),
            columns,
        }
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.header)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.value.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }
}

fn column(key: &'static str, header: &'static str, value: String) -> AttributeColumn {
    AttributeColumn { key, header, value }
}

// ── Number formatting ────────────────────────────────────────────────

/// Shortest rendering: integral values without a fractional part.
#[allow(clippy::cast_possible_truncation)]
fn plain_number(n: f64) -> String {
    if n.fract().abs() < f64::EPSILON && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// At most two decimals, trailing zeros trimmed.
fn two_decimals(n: f64) -> String {
    let fixed = format!("{n:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".into()
    } else {
        trimmed.into()
    }
}

/// Insert `,` every three digits of the integer part.
fn group_thousands(number: &str) -> String {
    let (sign, unsigned) = number
        .strip_prefix('-')
        .map_or(("", number), |rest| ("-", rest));
    let (int_part, frac_part) = unsigned
        .split_once('.')
        .map_or((unsigned, None), |(i, f)| (i, Some(f)));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::catalog::SpeciesCatalog;

    #[test]
    fn formats_by_attribute() {
        assert_eq!(format_attribute_value(&Value::Null, "roads_mi"), "");
        assert_eq!(format_attribute_value(&json!("High"), "CombinedRiskCategory"), "High");
        assert_eq!(format_attribute_value(&json!(12.6), "roads_km"), "13");
        assert_eq!(format_attribute_value(&json!(10), "range_area_km2"), "2,471");
        assert_eq!(format_attribute_value(&json!(3), "TotalSZEBRanking"), "3");
        assert_eq!(format_attribute_value(&json!(1234.5678), "elevation"), "1,234.57");
        assert_eq!(format_attribute_value(&json!(-0.001), "elevation"), "0");
        assert_eq!(format_attribute_value(&json!(true), "flag"), "true");
    }

    #[test]
    fn szeb_splits_into_zone_and_band() {
        assert_eq!(parse_szeb("123_4500"), ("123".into(), "4500".into()));
        assert_eq!(parse_szeb("081"), ("081".into(), String::new()));
        assert_eq!(parse_szeb(""), (String::new(), String::new()));
    }

    #[test]
    fn table_derives_zone_band_and_miles() {
        let catalog = SpeciesCatalog::builtin();
        let species = catalog.get_species("psme").unwrap();
        let properties = json!({
            "SZEB": "526_3000",
            "TotalSZEBRanking": 4,
            "CombinedRiskCategory": "Moderate",
            "ClimateExposureRiskCat": 2,
            "FireIntensityRiskCat": "Low",
            "roads_km": 100.0
        });

        let table = AttributeTable::build(properties.as_object().unwrap(), species);

        assert_eq!(table.title, "Douglas Fir Attributes");
        assert_eq!(table.scientific_name, "Pseudotsuga menziesii");
        assert_eq!(
            table.headers().collect::<Vec<_>>(),
            vec![
                "Seed Zone",
                "Elevation Band",
                "Total SZEB Rank",
                "Combined Risk",
                "Climate Exposure Risk",
                "Fire Intensity Risk",
                "Roads (mi)",
            ]
        );
        assert_eq!(
            table.values().collect::<Vec<_>>(),
            vec!["526", "3000", "4", "Moderate", "2", "Low", "62"]
        );
    }

    #[test]
    fn missing_properties_render_empty() {
        let catalog = SpeciesCatalog::builtin();
        let table = AttributeTable::build(&Map::new(), catalog.get_species("pipo").unwrap());
        assert!(table.values().all(str::is_empty));
        assert_eq!(table.get("roads_mi"), Some(""));
    }
}
