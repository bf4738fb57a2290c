//! Required-field schema for the readmission model input row.
//!
//! The schema is process-wide, read-only configuration: an ordered list of
//! field names the serialized pipeline expects, each with a declared domain
//! (bounds or enumerated options) and an optional numeric coercion. Prompt
//! order, completion detection, and row assembly all derive from this table.

use std::collections::HashMap;

use crate::errors::{DomainError, ValueType};

/// Declared domain of a field, used to validate raw values on the one-shot
/// record and batch paths. The chat path records raw text unconditionally and
/// only coerces at the completion turn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldKind {
    Text,
    Integer { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Categorical { options: &'static [&'static str] },
}

/// Numeric coercion applied when assembling the model input row. Only the
/// subset the pipeline expects as numeric is coerced; every other field is
/// passed through as text even when its domain is numeric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coercion {
    None,
    Integer,
    Float,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub coercion: Coercion,
}

pub const DIAGNOSIS_RANGES: &[&str] = &[
    "240-279 (Endocrine/Metabolic)",
    "630-679 (Pregnancy)",
    "001-139 (Infectious/Parasitic)",
    "140-239 (Neoplasms)",
    "390-459 (Circulatory)",
    "460-519 (Respiratory)",
    "800-999 (Injury/Poisoning)",
    "680-709 (Skin)",
    "710-739 (Musculoskeletal)",
    "520-579 (Digestive)",
    "V01-V91 (Health Status Factors)",
    "780-799 (Symptoms)",
    "580-629 (Genitourinary)",
    "290-319 (Mental Disorders)",
    "320-389 (Nervous System)",
    "280-289 (Blood Disorders)",
    "Other",
    "740-759 (Congenital)",
    "E800-E999 (External Causes)",
];

const RACES: &[&str] = &["Caucasian", "AfricanAmerican", "Asian", "Hispanic", "Other"];

const ADMISSION_CATEGORIES: &[&str] =
    &["other", "emergency", "urgent", "elective", "newborn", "trauma"];

const DISCHARGE_CARE_LEVELS: &[&str] = &[
    "25", "home", "rehab", "transfer", "short_hospital_stay", "AMA", "4",
    "long_hospital_stay", "death", "13", "12", "16", "17", "hospice", "9", "20", "15", "24",
    "28", "19", "27",
];

/// The model input schema, in prompt order. The pipeline rejects rows whose
/// columns do not match this set.
pub const REQUIRED_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "race",
        kind: FieldKind::Categorical { options: RACES },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "gender",
        kind: FieldKind::Categorical { options: &["Female", "Male"] },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "time_in_hospital",
        kind: FieldKind::Integer { min: 1, max: 14 },
        coercion: Coercion::Integer,
    },
    FieldSpec {
        name: "num_lab_procedures",
        kind: FieldKind::Integer { min: 1, max: 99 },
        coercion: Coercion::Integer,
    },
    FieldSpec {
        name: "num_procedures",
        kind: FieldKind::Integer { min: 0, max: 6 },
        coercion: Coercion::Integer,
    },
    FieldSpec {
        name: "num_medications",
        kind: FieldKind::Integer { min: 1, max: 60 },
        coercion: Coercion::Integer,
    },
    FieldSpec {
        name: "number_outpatient",
        kind: FieldKind::Integer { min: 0, max: 10 },
        coercion: Coercion::Integer,
    },
    FieldSpec {
        name: "number_emergency",
        kind: FieldKind::Integer { min: 0, max: 19 },
        coercion: Coercion::Integer,
    },
    FieldSpec {
        name: "number_inpatient",
        kind: FieldKind::Integer { min: 0, max: 14 },
        coercion: Coercion::Integer,
    },
    FieldSpec {
        name: "numchange",
        kind: FieldKind::Integer { min: 0, max: 4 },
        coercion: Coercion::Integer,
    },
    FieldSpec {
        name: "service_utilization",
        kind: FieldKind::Integer { min: 0, max: 31 },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "is_emergency_admission",
        kind: FieldKind::Integer { min: 0, max: 1 },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "admission_category",
        kind: FieldKind::Categorical { options: ADMISSION_CATEGORIES },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "discharge_to_home",
        kind: FieldKind::Integer { min: 0, max: 1 },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "discharge_care_level",
        kind: FieldKind::Categorical { options: DISCHARGE_CARE_LEVELS },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "admitted_from_emergency",
        kind: FieldKind::Integer { min: 0, max: 1 },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "age_midpoint",
        kind: FieldKind::Float { min: 5.0, max: 95.0 },
        coercion: Coercion::Float,
    },
    FieldSpec {
        name: "diag_1_range",
        kind: FieldKind::Categorical { options: DIAGNOSIS_RANGES },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "diag_2_range",
        kind: FieldKind::Categorical { options: DIAGNOSIS_RANGES },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "diag_3_range",
        kind: FieldKind::Categorical { options: DIAGNOSIS_RANGES },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "A1Cresult",
        kind: FieldKind::Integer { min: 0, max: 1 },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "max_glu_serum",
        kind: FieldKind::Integer { min: 0, max: 1 },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "diabetesMed",
        kind: FieldKind::Categorical { options: &["No", "Yes"] },
        coercion: Coercion::None,
    },
    FieldSpec {
        name: "Cluster",
        kind: FieldKind::Integer { min: 0, max: 3 },
        coercion: Coercion::None,
    },
];

/// Columns outside the required schema that still get a numeric coercion when
/// present in a batch upload (the pipeline accepts supersets of the schema).
pub const EXTRA_NUMERIC_COLUMNS: &[(&str, Coercion)] = &[("number_diagnoses", Coercion::Integer)];

pub fn field_names() -> impl Iterator<Item = &'static str> {
    REQUIRED_FIELDS.iter().map(|spec| spec.name)
}

pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    REQUIRED_FIELDS.iter().find(|spec| spec.name == name)
}

/// Coercion for a column, covering both schema fields and the known extra
/// numeric columns a batch may carry.
pub fn coercion_for_column(name: &str) -> Coercion {
    if let Some(spec) = field_spec(name) {
        return spec.coercion;
    }
    EXTRA_NUMERIC_COLUMNS
        .iter()
        .find(|(column, _)| *column == name)
        .map(|(_, coercion)| *coercion)
        .unwrap_or(Coercion::None)
}

/// Schema-ordered list of fields not yet collected. Collection order never
/// matters: the prompt sequence always follows this order.
pub fn missing_fields(collected: &HashMap<String, String>) -> Vec<&'static str> {
    field_names().filter(|name| !collected.contains_key(*name)).collect()
}

/// Strict domain validation for the one-shot record and batch paths.
pub fn validate_raw(spec: &FieldSpec, value: &str) -> Result<(), DomainError> {
    let trimmed = value.trim();
    match spec.kind {
        FieldKind::Text => Ok(()),
        FieldKind::Integer { min, max } => {
            let parsed = trimmed.parse::<i64>().map_err(|_| DomainError::TypeMismatch {
                field: spec.name.to_owned(),
                value: value.to_owned(),
                expected: ValueType::Integer,
                row: None,
            })?;
            if parsed < min || parsed > max {
                return Err(DomainError::OutOfRange {
                    field: spec.name.to_owned(),
                    value: value.to_owned(),
                    domain: format!("{min}..={max}"),
                });
            }
            Ok(())
        }
        FieldKind::Float { min, max } => {
            let parsed = trimmed.parse::<f64>().map_err(|_| DomainError::TypeMismatch {
                field: spec.name.to_owned(),
                value: value.to_owned(),
                expected: ValueType::Float,
                row: None,
            })?;
            if parsed < min || parsed > max {
                return Err(DomainError::OutOfRange {
                    field: spec.name.to_owned(),
                    value: value.to_owned(),
                    domain: format!("{min}..={max}"),
                });
            }
            Ok(())
        }
        FieldKind::Categorical { options } => {
            if options.contains(&trimmed) {
                Ok(())
            } else {
                Err(DomainError::UnknownOption {
                    field: spec.name.to_owned(),
                    value: value.to_owned(),
                })
            }
        }
    }
}
