// GeoJSON payloads and coordinate primitives shared by the WMS/WFS calls.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A geographic position in EPSG:4326 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Axis-aligned extent in EPSG:4326 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// `west,south,east,north` -- the order WMS 1.1.1 expects for EPSG:4326.
    pub fn to_bbox_string(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn contains(&self, point: LatLng) -> bool {
        (self.west..=self.east).contains(&point.lng) && (self.south..=self.north).contains(&point.lat)
    }
}

/// A GeoJSON `FeatureCollection` as returned by GeoServer's JSON output formats.
///
/// Unknown top-level members (`totalFeatures`, `crs`, ...) are preserved in
/// `extra` so callers can pass the payload through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "feature_collection_type")]
    pub kind: String,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn feature_collection_type() -> String {
    "FeatureCollection".into()
}

impl FeatureCollection {
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn first(&self) -> Option<&Feature> {
        self.features.first()
    }
}

/// A single GeoJSON feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub geometry: Option<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Map<String, Value>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(d)?.unwrap_or_default())
}

fn feature_type() -> String {
    "Feature".into()
}

impl Feature {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bbox_string_is_west_south_east_north() {
        let bbox = BoundingBox::new(-123.5, 37.0, -121.0, 39.25);
        assert_eq!(bbox.to_bbox_string(), "-123.5,37,-121,39.25");
    }

    #[test]
    fn feature_collection_tolerates_missing_features() {
        let fc: FeatureCollection =
            serde_json::from_str(r#"{"type":"FeatureCollection","totalFeatures":0}"#).unwrap();
        assert!(fc.is_empty());
        assert_eq!(fc.extra.get("totalFeatures"), Some(&Value::from(0)));
    }

    #[test]
    fn feature_properties_are_addressable() {
        let fc: FeatureCollection = serde_json::from_str(
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","id":"x.1","geometry":null,"properties":{"GRAY_INDEX":42}}]}"#,
        )
        .unwrap();
        let first = fc.first().unwrap();
        assert_eq!(first.property("GRAY_INDEX"), Some(&Value::from(42)));
    }
}
