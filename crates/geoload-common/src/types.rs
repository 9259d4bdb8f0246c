//! Shared domain types for geoload
//!
//! Warehouse-facing schema and destination types used by both the pipeline
//! and the warehouse collaborator.

use serde::{Deserialize, Serialize};

/// Column type of a warehouse schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Geography,
    Json,
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "STRING",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Geography => "GEOGRAPHY",
            FieldType::Json => "JSON",
        }
    }
}

/// Nullability mode of a warehouse schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Required,
    Nullable,
    Repeated,
}

impl FieldMode {
    pub fn as_str(&self) -> &str {
        match self {
            FieldMode::Required => "REQUIRED",
            FieldMode::Nullable => "NULLABLE",
            FieldMode::Repeated => "REPEATED",
        }
    }
}

/// One column of a warehouse table schema
///
/// Field names are unique within one schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: FieldMode,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: FieldType, mode: FieldMode) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode,
        }
    }
}

/// Fully qualified warehouse table reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDestination {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableDestination {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

impl std::fmt::Display for TableDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.project_id, self.dataset_id, self.table_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_as_str() {
        assert_eq!(FieldType::String.as_str(), "STRING");
        assert_eq!(FieldType::Geography.as_str(), "GEOGRAPHY");
        assert_eq!(FieldMode::Nullable.as_str(), "NULLABLE");
    }

    #[test]
    fn test_schema_field_serializes_with_upper_case_wire_names() {
        let field = SchemaField::new("parcel_id", FieldType::Integer, FieldMode::Required);
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["name"], "parcel_id");
        assert_eq!(json["type"], "INTEGER");
        assert_eq!(json["mode"], "REQUIRED");
    }

    #[test]
    fn test_table_destination_display() {
        let dest = TableDestination::new("acme-gis", "geo", "parcels");
        assert_eq!(dest.to_string(), "acme-gis.geo.parcels");
    }
}
