//! Prediction oracle contract.
//!
//! The trained pipeline (preprocessing + classifier) is an external
//! collaborator: this module defines the seam it is called through and ships a
//! deterministic built-in implementation so the engine is fully testable and
//! replayable without the serialized model artifact. All predictions are pure
//! functions of the input rows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::Record;
use crate::schema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLabel {
    NotReadmitted,
    Readmitted,
}

impl RiskLabel {
    pub fn from_probability(positive: f64) -> Self {
        if positive >= 0.5 {
            Self::Readmitted
        } else {
            Self::NotReadmitted
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::NotReadmitted => 0,
            Self::Readmitted => 1,
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReadmitted => write!(f, "Not Readmitted"),
            Self::Readmitted => write!(f, "Readmitted"),
        }
    }
}

/// Per-row outcome rendered into chat messages. Ephemeral by design: it lives
/// in the formatted message, never in a store.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PredictionResult {
    pub label: RiskLabel,
    /// Positive-class (readmission) probability.
    pub probability: f64,
}

/// Vectorized oracle output: one label and a two-class probability row per
/// input row.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionBatch {
    labels: Vec<RiskLabel>,
    probabilities: Vec<[f64; 2]>,
}

impl PredictionBatch {
    pub fn new(labels: Vec<RiskLabel>, probabilities: Vec<[f64; 2]>) -> Self {
        debug_assert_eq!(labels.len(), probabilities.len());
        Self { labels, probabilities }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn result(&self, row: usize) -> Option<PredictionResult> {
        Some(PredictionResult {
            label: *self.labels.get(row)?,
            probability: self.probabilities.get(row)?[1],
        })
    }

    pub fn labels_u8(&self) -> Vec<u8> {
        self.labels.iter().map(|label| label.as_u8()).collect()
    }

    pub fn positive_probabilities(&self) -> Vec<f64> {
        self.probabilities.iter().map(|row| row[1]).collect()
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum OracleError {
    #[error("oracle rejected input, missing columns: {}", .missing_columns.join(", "))]
    SchemaMismatch { missing_columns: Vec<String> },
    #[error("oracle transport failure: {0}")]
    Transport(String),
    #[error("oracle returned a malformed response: {0}")]
    Malformed(String),
}

/// The seam the engine calls the trained pipeline through. Implementations
/// must be pure with respect to the input rows: same rows, same output.
#[async_trait]
pub trait Oracle: Send + Sync {
    fn name(&self) -> &'static str;
    async fn predict(&self, rows: &[Record]) -> Result<PredictionBatch, OracleError>;
}

/// Deterministic logistic model standing in for the serialized pipeline.
///
/// Weights are fixed, versioned constants over normalized utilization and
/// history features; there is no training path in this codebase.
#[derive(Clone, Debug)]
pub struct LogisticOracle {
    weights: [f64; Self::FEATURE_DIM],
}

impl LogisticOracle {
    pub const MODEL_VERSION: &'static str = "logistic-2024.1";
    pub const FEATURE_DIM: usize = 11;

    const DEFAULT_WEIGHTS: [f64; Self::FEATURE_DIM] = [
        -2.2, // bias
        0.9,  // time_in_hospital / 14
        0.6,  // num_medications / 60
        1.6,  // number_inpatient / 14
        1.2,  // number_emergency / 19
        0.8,  // service_utilization / 31
        0.7,  // age_midpoint / 95
        0.5,  // A1Cresult
        0.4,  // max_glu_serum
        0.3,  // diabetesMed == Yes
        0.6,  // is_emergency_admission
    ];

    pub fn new() -> Self {
        Self { weights: Self::DEFAULT_WEIGHTS }
    }

    pub fn with_weights(weights: [f64; Self::FEATURE_DIM]) -> Self {
        Self { weights }
    }

    fn sigmoid(z: f64) -> f64 {
        let z = z.clamp(-500.0, 500.0);
        1.0 / (1.0 + (-z).exp())
    }

    fn validate_columns(rows: &[Record]) -> Result<(), OracleError> {
        for row in rows {
            let missing: Vec<String> = schema::field_names()
                .filter(|name| row.get(name).is_none())
                .map(str::to_owned)
                .collect();
            if !missing.is_empty() {
                return Err(OracleError::SchemaMismatch { missing_columns: missing });
            }
        }
        Ok(())
    }

    fn feature_vector(record: &Record) -> [f64; Self::FEATURE_DIM] {
        let numeric = |name: &str, scale: f64| {
            record.get(name).and_then(|value| value.as_f64()).unwrap_or(0.0) / scale
        };
        let flag = |name: &str| {
            record.get(name).and_then(|value| value.as_f64()).unwrap_or(0.0).clamp(0.0, 1.0)
        };
        let diabetes_med = match record.get("diabetesMed").and_then(|value| value.as_text()) {
            Some("Yes") => 1.0,
            _ => 0.0,
        };

        [
            1.0,
            numeric("time_in_hospital", 14.0).clamp(0.0, 1.0),
            numeric("num_medications", 60.0).clamp(0.0, 1.0),
            numeric("number_inpatient", 14.0).clamp(0.0, 1.0),
            numeric("number_emergency", 19.0).clamp(0.0, 1.0),
            numeric("service_utilization", 31.0).clamp(0.0, 1.0),
            numeric("age_midpoint", 95.0).clamp(0.0, 1.0),
            flag("A1Cresult"),
            flag("max_glu_serum"),
            diabetes_med,
            flag("is_emergency_admission"),
        ]
    }

    fn score(&self, record: &Record) -> f64 {
        let features = Self::feature_vector(record);
        let z: f64 = self.weights.iter().zip(features.iter()).map(|(w, x)| w * x).sum();
        Self::sigmoid(z)
    }
}

impl Default for LogisticOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Oracle for LogisticOracle {
    fn name(&self) -> &'static str {
        "builtin-logistic"
    }

    async fn predict(&self, rows: &[Record]) -> Result<PredictionBatch, OracleError> {
        Self::validate_columns(rows)?;

        let mut labels = Vec::with_capacity(rows.len());
        let mut probabilities = Vec::with_capacity(rows.len());
        for row in rows {
            let positive = self.score(row);
            labels.push(RiskLabel::from_probability(positive));
            probabilities.push([1.0 - positive, positive]);
        }
        Ok(PredictionBatch::new(labels, probabilities))
    }
}
