//! Schema inference
//!
//! Derives a column-typed schema from an encoded record stream when the
//! caller supplied none. Single pass and streaming-safe: only per-field
//! aggregates are held, never the records themselves.
//!
//! Typing rules per field, across all records:
//!
//! - STRING unless every non-null value is numeric or boolean.
//! - INTEGER when every non-null value is an integral number; FLOAT once
//!   any non-integral number is observed. Upgrades are one-directional
//!   within a pass (a trailing integral value never downgrades FLOAT).
//! - BOOLEAN when every non-null value is a boolean.
//! - A field literally named `geometry` is always GEOGRAPHY.
//! - Mode is NULLABLE when the field was ever null or absent, else REQUIRED.
//!
//! Output field order is first-seen order, so inference is deterministic
//! and idempotent over the same stream.

use geoload_common::{FieldMode, FieldType, SchemaField};
use serde_json::Value;
use std::collections::HashMap;

use super::encode::{Record, GEOMETRY_FIELD};

#[derive(Debug, Default)]
struct FieldObservations {
    values_seen: u64,
    integral: u64,
    fractional: u64,
    booleans: u64,
    nullable: bool,
    /// Index of the last record this field appeared in, for absence tracking
    last_record: u64,
}

/// Streaming schema inference over a record stream
#[derive(Debug, Default)]
pub struct SchemaInference {
    order: Vec<String>,
    fields: HashMap<String, FieldObservations>,
    records_seen: u64,
}

impl SchemaInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the aggregates
    pub fn observe(&mut self, record: &Record) {
        self.records_seen += 1;

        let records_seen = self.records_seen;
        for (name, value) in record {
            if !self.fields.contains_key(name) {
                self.order.push(name.clone());
            }

            let observations = self.fields.entry(name.clone()).or_insert_with(|| {
                FieldObservations {
                    // Absent from every earlier record
                    nullable: records_seen > 1,
                    ..Default::default()
                }
            });
            observations.last_record = records_seen;

            match value {
                Value::Null => observations.nullable = true,
                Value::Bool(_) => {
                    observations.values_seen += 1;
                    observations.booleans += 1;
                },
                Value::Number(n) => {
                    observations.values_seen += 1;
                    if is_integral(n) {
                        observations.integral += 1;
                    } else {
                        observations.fractional += 1;
                    }
                },
                _ => observations.values_seen += 1,
            }
        }
    }

    /// Produce the schema; `integer_columns` are forced to INTEGER
    pub fn finish(self, integer_columns: &[String]) -> Vec<SchemaField> {
        let records_seen = self.records_seen;
        let mut fields = self.fields;

        self.order
            .into_iter()
            .map(|name| {
                let observations = fields.remove(&name).unwrap_or_default();

                let field_type = if name == GEOMETRY_FIELD {
                    FieldType::Geography
                } else if integer_columns.contains(&name) {
                    FieldType::Integer
                } else {
                    infer_type(&observations)
                };

                let absent_somewhere =
                    observations.nullable || observations.last_record < records_seen;
                let mode = if absent_somewhere {
                    FieldMode::Nullable
                } else {
                    FieldMode::Required
                };

                SchemaField::new(name, field_type, mode)
            })
            .collect()
    }
}

fn infer_type(observations: &FieldObservations) -> FieldType {
    let FieldObservations {
        values_seen,
        integral,
        fractional,
        booleans,
        ..
    } = *observations;

    if values_seen == 0 {
        FieldType::String
    } else if booleans == values_seen {
        FieldType::Boolean
    } else if integral + fractional == values_seen {
        if fractional > 0 {
            FieldType::Float
        } else {
            FieldType::Integer
        }
    } else {
        FieldType::String
    }
}

fn is_integral(n: &serde_json::Number) -> bool {
    if n.is_i64() || n.is_u64() {
        return true;
    }
    n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
}

/// Infer a schema over materialized records
pub fn infer_schema(records: &[Record], integer_columns: &[String]) -> Vec<SchemaField> {
    let mut inference = SchemaInference::new();
    for record in records {
        inference.observe(record);
    }
    inference.finish(integer_columns)
}
