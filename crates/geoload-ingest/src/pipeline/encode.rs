//! Record encoding
//!
//! Flattens each feature of a collection into one self-contained JSON
//! object: the non-geometry properties verbatim, plus a serialized geometry
//! value in a string field. The output is a lazy, finite, single-pass
//! iterator; re-encoding requires re-reading the source collection.
//!
//! Geometry handling depends on the requested encoding:
//!
//! - `Json` (default): the geometry object is serialized to a JSON string
//!   with any bounding box stripped; all geometry types pass through.
//! - `Wkt`: a LineString is treated as a polygon boundary. An open ring is
//!   closed by appending the first point, then the sequence becomes a
//!   `POLYGON((lon lat, ...))` string. Features whose geometry is not a
//!   LineString with a non-empty coordinate sequence are dropped.
//!
//! Plain JSON and CSV inputs bypass geometry handling entirely and enter
//! the pipeline as ready-made records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::geojson::{Feature, FeatureCollection};
use super::{PipelineError, Result};

/// Name of the serialized geometry field on encoded records
pub const GEOMETRY_FIELD: &str = "geometry";

/// One flattened record, ready for NDJSON serialization
pub type Record = Map<String, Value>;

/// How the geometry value of each feature is serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryEncoding {
    /// Geometry as a JSON-encoded object string
    #[default]
    Json,
    /// Geometry as a Well-Known-Text polygon string
    Wkt,
}

/// Encode a feature collection into flattened records
pub fn encode_features(
    collection: FeatureCollection,
    encoding: GeometryEncoding,
) -> impl Iterator<Item = Result<Record>> {
    collection
        .features
        .into_iter()
        .filter_map(move |feature| encode_feature(feature, encoding).transpose())
}

fn encode_feature(feature: Feature, encoding: GeometryEncoding) -> Result<Option<Record>> {
    let mut record = feature.properties;

    let Some(geometry) = feature.geometry else {
        // Features without geometry keep their attributes; the geometry
        // column is simply absent and inference marks it NULLABLE.
        return Ok(Some(record));
    };

    let encoded = match encoding {
        GeometryEncoding::Json => geometry.to_json_string()?,
        GeometryEncoding::Wkt => match geometry.line_string_positions() {
            Some(positions) => polygon_wkt(positions),
            None => {
                warn!(
                    geometry_type = %geometry.kind,
                    "Dropping feature: WKT encoding requires a LineString with coordinates"
                );
                return Ok(None);
            },
        },
    };

    record.insert(GEOMETRY_FIELD.to_string(), Value::String(encoded));
    Ok(Some(record))
}

/// Build a POLYGON WKT string from a boundary, closing the ring if open
fn polygon_wkt(mut positions: Vec<(f64, f64)>) -> String {
    let first = positions[0];
    let last = positions[positions.len() - 1];
    if first != last {
        positions.push(first);
    }

    let ring = positions
        .iter()
        .map(|(lon, lat)| format!("{} {}", lon, lat))
        .collect::<Vec<_>>()
        .join(", ");

    format!("POLYGON(({}))", ring)
}

/// Serialize records as newline-delimited JSON, one record per line
pub fn to_ndjson(records: &[Record]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Parse a plain JSON document (object or array of objects) into records
pub fn parse_json_records(bytes: &[u8]) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| PipelineError::Validation(format!("Invalid JSON input: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => {
            return Err(PipelineError::Validation(
                "JSON input must be an object or an array of objects".to_string(),
            ))
        },
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            _ => Err(PipelineError::Validation(
                "JSON input must be an object or an array of objects".to_string(),
            )),
        })
        .collect()
}

/// Parse CSV bytes into records; empty cells become null
pub fn parse_csv_records(bytes: &[u8]) -> Result<Vec<Record>> {
    let mut reader = csv::Reader::from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::Validation(format!("Invalid CSV input: {}", e)))?
        .clone();

    if headers.is_empty() {
        return Err(PipelineError::Validation("CSV input is empty".to_string()));
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| PipelineError::Validation(format!("Invalid CSV row: {}", e)))?;
        let mut record = Record::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            let value = if cell.is_empty() {
                Value::Null
            } else {
                Value::String(cell.to_string())
            };
            record.insert(header.to_string(), value);
        }
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collection(features: Value) -> FeatureCollection {
        serde_json::from_value(json!({
            "type": "FeatureCollection",
            "features": features
        }))
        .unwrap()
    }

    fn line_string_feature(coordinates: Value) -> Value {
        json!({
            "type": "Feature",
            "geometry": { "type": "LineString", "coordinates": coordinates },
            "properties": { "parcel": "p-1" }
        })
    }

    #[test]
    fn test_wkt_encoding_closes_an_open_ring() {
        let collection = collection(json!([
            line_string_feature(json!([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]))
        ]));

        let records: Vec<Record> = encode_features(collection, GeometryEncoding::Wkt)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0][GEOMETRY_FIELD],
            json!("POLYGON((0 0, 1 0, 1 1, 0 0))")
        );
        assert_eq!(records[0]["parcel"], json!("p-1"));
    }

    #[test]
    fn test_wkt_encoding_keeps_a_closed_ring_unchanged() {
        let collection = collection(json!([
            line_string_feature(json!([[0.0, 0.0], [1.0, 0.0], [0.0, 0.0]]))
        ]));

        let records: Vec<Record> = encode_features(collection, GeometryEncoding::Wkt)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(
            records[0][GEOMETRY_FIELD],
            json!("POLYGON((0 0, 1 0, 0 0))")
        );
    }

    #[test]
    fn test_wkt_encoding_drops_non_line_string_features() {
        let collection = collection(json!([
            {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [1.0, 2.0] },
                "properties": { "parcel": "p-1" }
            },
            line_string_feature(json!([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]))
        ]));

        let records: Vec<Record> = encode_features(collection, GeometryEncoding::Wkt)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_json_encoding_passes_geometry_through_as_string() {
        let collection = collection(json!([
            {
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [1.0, 2.0],
                    "bbox": [1.0, 2.0, 1.0, 2.0]
                },
                "properties": { "parcel": "p-1", "area": 12.5 }
            }
        ]));

        let records: Vec<Record> = encode_features(collection, GeometryEncoding::Json)
            .collect::<Result<_>>()
            .unwrap();

        let geometry = records[0][GEOMETRY_FIELD].as_str().unwrap();
        let parsed: Value = serde_json::from_str(geometry).unwrap();
        assert_eq!(parsed["type"], "Point");
        assert!(parsed.get("bbox").is_none());
        assert_eq!(records[0]["area"], json!(12.5));
    }

    #[test]
    fn test_feature_without_geometry_keeps_attributes() {
        let collection = collection(json!([
            { "type": "Feature", "geometry": null, "properties": { "parcel": "p-1" } }
        ]));

        let records: Vec<Record> = encode_features(collection, GeometryEncoding::Json)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].get(GEOMETRY_FIELD).is_none());
    }

    #[test]
    fn test_to_ndjson_emits_one_line_per_record() {
        let records = vec![
            serde_json::from_value::<Record>(json!({ "a": 1 })).unwrap(),
            serde_json::from_value::<Record>(json!({ "a": 2 })).unwrap(),
        ];

        let ndjson = to_ndjson(&records).unwrap();
        let text = String::from_utf8(ndjson).unwrap();
        assert_eq!(text, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn test_parse_json_records_accepts_object_and_array() {
        let array = parse_json_records(br#"[{ "a": 1 }, { "a": 2 }]"#).unwrap();
        assert_eq!(array.len(), 2);

        let single = parse_json_records(br#"{ "a": 1 }"#).unwrap();
        assert_eq!(single.len(), 1);

        assert!(parse_json_records(b"[1, 2]").is_err());
        assert!(parse_json_records(b"not json").is_err());
    }

    #[test]
    fn test_parse_csv_records_maps_empty_cells_to_null() {
        let records = parse_csv_records(b"name,area\nalpha,12\nbeta,\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], json!("alpha"));
        assert_eq!(records[0]["area"], json!("12"));
        assert_eq!(records[1]["area"], Value::Null);
    }
}
