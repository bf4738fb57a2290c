use thiserror::Error;

/// Target type for a numeric coercion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    Float,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
        }
    }
}

/// Recoverable domain failures. Everything here is caught at the turn
/// boundary and rendered as a chat message; nothing is fatal to the process.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("value `{value}` for field `{field}` cannot be coerced to {expected}{}", row_suffix(.row))]
    TypeMismatch { field: String, value: String, expected: ValueType, row: Option<usize> },
    #[error("input is missing required columns: {}", .missing_columns.join(", "))]
    SchemaMismatch { missing_columns: Vec<String> },
    #[error("completion requested while fields are still missing: {}", .missing.join(", "))]
    PrematureCompletion { missing: Vec<String> },
    #[error("value `{value}` for field `{field}` is outside the allowed range {domain}")]
    OutOfRange { field: String, value: String, domain: String },
    #[error("value `{value}` is not a recognized option for field `{field}`")]
    UnknownOption { field: String, value: String },
}

fn row_suffix(row: &Option<usize>) -> String {
    match row {
        Some(index) => format!(" (row {index})"),
        None => String::new(),
    }
}

impl DomainError {
    /// Chat-safe wording for the operator. `PrematureCompletion` is a caller
    /// bug and keeps its diagnostic text instead of a friendly rewording.
    pub fn user_message(&self) -> String {
        match self {
            Self::TypeMismatch { field, value, row: Some(index), .. } => format!(
                "Row {index}: please fix **{field}** — `{value}` is not a number."
            ),
            Self::TypeMismatch { field, .. } => {
                format!("Please re-enter **{field}** as a number.")
            }
            Self::SchemaMismatch { missing_columns } => format!(
                "The upload is missing required columns: {}.",
                missing_columns.join(", ")
            ),
            Self::OutOfRange { field, value, domain } => {
                format!("**{field}** must be within {domain}; got `{value}`.")
            }
            Self::UnknownOption { field, value } => {
                format!("`{value}` is not a recognized option for **{field}**.")
            }
            Self::PrematureCompletion { .. } => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DomainError, ValueType};

    #[test]
    fn type_mismatch_display_includes_row_when_present() {
        let error = DomainError::TypeMismatch {
            field: "time_in_hospital".to_owned(),
            value: "abc".to_owned(),
            expected: ValueType::Integer,
            row: Some(2),
        };

        assert_eq!(
            error.to_string(),
            "value `abc` for field `time_in_hospital` cannot be coerced to integer (row 2)"
        );
    }

    #[test]
    fn type_mismatch_user_message_asks_for_reentry() {
        let error = DomainError::TypeMismatch {
            field: "num_procedures".to_owned(),
            value: "many".to_owned(),
            expected: ValueType::Integer,
            row: None,
        };

        assert_eq!(error.user_message(), "Please re-enter **num_procedures** as a number.");
    }

    #[test]
    fn schema_mismatch_lists_all_missing_columns() {
        let error = DomainError::SchemaMismatch {
            missing_columns: vec!["race".to_owned(), "gender".to_owned()],
        };

        assert!(error.user_message().contains("race, gender"));
    }
}
