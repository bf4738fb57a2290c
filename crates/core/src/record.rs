//! Typed rows for the prediction pipeline.
//!
//! Field values stay raw text until row assembly, where the schema's coercion
//! table turns the known numeric subset into integers and `age_midpoint` into
//! a float. Batch tables follow the same rules column-wise, with row indices
//! carried into coercion errors so a bad upload is precisely reportable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, ValueType};
use crate::schema::{self, Coercion};

/// A single cell: raw text until coercion, typed afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Text(value) => value.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

/// One model input row with schema-ordered columns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, value)| value)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Assemble the single-row model input from collected chat answers,
    /// applying the schema coercion table. Column order is schema order.
    ///
    /// Coercion failures do not roll anything back; the caller keeps its
    /// collected map untouched and decides how to recover.
    pub fn from_collected(collected: &HashMap<String, String>) -> Result<Self, DomainError> {
        let missing = schema::missing_fields(collected);
        if !missing.is_empty() {
            return Err(DomainError::PrematureCompletion {
                missing: missing.into_iter().map(str::to_owned).collect(),
            });
        }

        let mut record = Record::default();
        for spec in schema::REQUIRED_FIELDS {
            let raw = &collected[spec.name];
            record.push(spec.name, coerce_value(spec.name, raw, spec.coercion, None)?);
        }
        Ok(record)
    }
}

fn coerce_value(
    field: &str,
    raw: &str,
    coercion: Coercion,
    row: Option<usize>,
) -> Result<FieldValue, DomainError> {
    let trimmed = raw.trim();
    match coercion {
        Coercion::None => Ok(FieldValue::Text(raw.to_owned())),
        Coercion::Integer => trimmed.parse::<i64>().map(FieldValue::Int).map_err(|_| {
            DomainError::TypeMismatch {
                field: field.to_owned(),
                value: raw.to_owned(),
                expected: ValueType::Integer,
                row,
            }
        }),
        Coercion::Float => trimmed.parse::<f64>().map(FieldValue::Float).map_err(|_| {
            DomainError::TypeMismatch {
                field: field.to_owned(),
                value: raw.to_owned(),
                expected: ValueType::Float,
                row,
            }
        }),
    }
}

/// A one-shot upload: raw rows in, coerced rows out, then discarded after
/// scoring. Never retained across turns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchTable {
    rows: Vec<Vec<(String, String)>>,
}

impl BatchTable {
    /// Parse a JSON array of objects into a raw table. Scalar JSON values are
    /// stringified; nested structures are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DomainError> {
        let array = value.as_array().ok_or_else(|| DomainError::SchemaMismatch {
            missing_columns: schema::field_names().map(str::to_owned).collect(),
        })?;

        let mut rows = Vec::with_capacity(array.len());
        for entry in array {
            let object = entry.as_object().ok_or_else(|| DomainError::SchemaMismatch {
                missing_columns: schema::field_names().map(str::to_owned).collect(),
            })?;
            let mut row = Vec::with_capacity(object.len());
            for (column, cell) in object {
                row.push((column.clone(), stringify_cell(cell)));
            }
            rows.push(row);
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every row must carry at least the required schema columns; supersets
    /// are allowed and passed through to the oracle.
    pub fn validate_columns(&self) -> Result<(), DomainError> {
        for row in &self.rows {
            let missing: Vec<String> = schema::field_names()
                .filter(|name| !row.iter().any(|(column, _)| column == name))
                .map(str::to_owned)
                .collect();
            if !missing.is_empty() {
                return Err(DomainError::SchemaMismatch { missing_columns: missing });
            }
        }
        Ok(())
    }

    /// Type every known numeric column. The first offending cell fails the
    /// whole batch with its row index and column name.
    pub fn coerce(&self) -> Result<Vec<Record>, DomainError> {
        let mut records = Vec::with_capacity(self.rows.len());
        for (index, row) in self.rows.iter().enumerate() {
            let mut record = Record::default();
            for (column, raw) in row {
                let coercion = schema::coercion_for_column(column);
                record.push(column.clone(), coerce_value(column, raw, coercion, Some(index))?);
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn stringify_cell(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub const PREDICTION_COLUMN: &str = "Readmission Prediction";
pub const PROBABILITY_COLUMN: &str = "Readmission Probability";

/// Batch output: the input rows with the two prediction columns appended.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoredTable {
    pub rows: Vec<Record>,
}

impl ScoredTable {
    pub fn new(mut records: Vec<Record>, labels: &[u8], probabilities: &[f64]) -> Self {
        for ((record, label), probability) in
            records.iter_mut().zip(labels).zip(probabilities)
        {
            record.push(PREDICTION_COLUMN, FieldValue::Int(i64::from(*label)));
            record.push(PROBABILITY_COLUMN, FieldValue::Float(*probability));
        }
        Self { rows: records }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|record| {
                let mut object = serde_json::Map::new();
                for (name, value) in record.iter() {
                    let cell = match value {
                        FieldValue::Int(v) => serde_json::json!(v),
                        FieldValue::Float(v) => serde_json::json!(v),
                        FieldValue::Text(v) => serde_json::json!(v),
                    };
                    object.insert(name.to_owned(), cell);
                }
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}
