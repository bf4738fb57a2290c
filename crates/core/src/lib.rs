pub mod config;
pub mod errors;
pub mod oracle;
pub mod record;
pub mod schema;

pub use config::{
    AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, LoggingConfig, OracleConfig,
    OracleProvider, ServerConfig,
};
pub use errors::{DomainError, ValueType};
pub use oracle::{
    LogisticOracle, Oracle, OracleError, PredictionBatch, PredictionResult, RiskLabel,
};
pub use record::{
    BatchTable, FieldValue, Record, ScoredTable, PREDICTION_COLUMN, PROBABILITY_COLUMN,
};
pub use schema::{Coercion, FieldKind, FieldSpec, EXTRA_NUMERIC_COLUMNS, REQUIRED_FIELDS};
