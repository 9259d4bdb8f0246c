//! GeoJSON interchange model
//!
//! The tool-agnostic feature-collection representation used as the
//! conversion midpoint between source vector formats and the flattened
//! record stream. Geometries are polymorphic, so coordinates and any
//! type-specific members are kept as raw JSON values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A GeoJSON feature collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub features: Vec<Feature>,
}

/// A single feature: geometry plus attribute properties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A geometry object of any GeoJSON type
///
/// `coordinates` is absent for `GeometryCollection`, whose members land in
/// `extra` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub coordinates: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Geometry {
    /// The positions of a LineString geometry, as (lon, lat) pairs
    ///
    /// Returns `None` for other geometry types, an empty coordinate
    /// sequence, or positions that are not numeric arrays.
    pub fn line_string_positions(&self) -> Option<Vec<(f64, f64)>> {
        if self.kind != "LineString" {
            return None;
        }

        let positions = self.coordinates.as_array()?;
        if positions.is_empty() {
            return None;
        }

        positions
            .iter()
            .map(|position| {
                let parts = position.as_array()?;
                let lon = parts.first()?.as_f64()?;
                let lat = parts.get(1)?.as_f64()?;
                Some((lon, lat))
            })
            .collect()
    }

    /// Serialize to a JSON string with any bounding box stripped
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        let mut stripped = self.clone();
        stripped.extra.remove("bbox");
        serde_json::to_string(&stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_feature_collection() {
        let collection: FeatureCollection = serde_json::from_value(json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [1.0, 2.0] },
                    "properties": { "name": "a" }
                }
            ]
        }))
        .unwrap();

        assert_eq!(collection.features.len(), 1);
        let geometry = collection.features[0].geometry.as_ref().unwrap();
        assert_eq!(geometry.kind, "Point");
    }

    #[test]
    fn test_line_string_positions() {
        let geometry: Geometry = serde_json::from_value(json!({
            "type": "LineString",
            "coordinates": [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]
        }))
        .unwrap();

        assert_eq!(
            geometry.line_string_positions().unwrap(),
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]
        );
    }

    #[test]
    fn test_line_string_positions_rejects_other_types_and_empty() {
        let point: Geometry =
            serde_json::from_value(json!({ "type": "Point", "coordinates": [1.0, 2.0] })).unwrap();
        assert!(point.line_string_positions().is_none());

        let empty: Geometry =
            serde_json::from_value(json!({ "type": "LineString", "coordinates": [] })).unwrap();
        assert!(empty.line_string_positions().is_none());
    }

    #[test]
    fn test_to_json_string_strips_bbox() {
        let geometry: Geometry = serde_json::from_value(json!({
            "type": "Point",
            "coordinates": [1.0, 2.0],
            "bbox": [1.0, 2.0, 1.0, 2.0]
        }))
        .unwrap();

        let encoded = geometry.to_json_string().unwrap();
        assert!(!encoded.contains("bbox"));
        assert!(encoded.contains("\"type\":\"Point\""));
    }
}
