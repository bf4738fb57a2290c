//! HTTP client for an externally hosted prediction service.
//!
//! Wire contract: `POST {base_url}/predict` with `{"rows": [...]}` where each
//! row is a flat JSON object, answered with `{"labels": [...],
//! "probabilities": [[p0, p1], ...]}` aligned index-for-index with the rows.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::warn;

use readmit_core::config::OracleConfig;
use readmit_core::oracle::{Oracle, OracleError, PredictionBatch, RiskLabel};
use readmit_core::record::{FieldValue, Record};

pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl HttpOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| OracleError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/predict", base_url.trim_end_matches('/')),
            api_key: None,
            max_retries: 0,
        })
    }

    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            OracleError::Transport("http oracle requires a base_url".to_owned())
        })?;
        let mut oracle = Self::new(base_url, Duration::from_secs(config.timeout_secs))?;
        oracle.api_key = config.api_key.clone();
        oracle.max_retries = config.max_retries;
        Ok(oracle)
    }

    async fn call_once(&self, body: &serde_json::Value) -> Result<PredictResponse, OracleError> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| OracleError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OracleError::Transport(format!(
                "prediction service returned {status}: {detail}"
            )));
        }

        response
            .json::<PredictResponse>()
            .await
            .map_err(|error| OracleError::Malformed(error.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    labels: Vec<u8>,
    probabilities: Vec<[f64; 2]>,
}

/// Serialize rows for the wire. Typed cells keep their JSON types; text stays
/// text.
fn rows_to_json(rows: &[Record]) -> serde_json::Value {
    let encoded: Vec<serde_json::Value> = rows
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
    serde_json::json!({ "rows": encoded })
}

fn parse_response(response: PredictResponse, row_count: usize) -> Result<PredictionBatch, OracleError> {
    if response.labels.len() != row_count || response.probabilities.len() != row_count {
        return Err(OracleError::Malformed(format!(
            "expected {row_count} predictions, got {} labels and {} probability rows",
            response.labels.len(),
            response.probabilities.len()
        )));
    }

    let mut labels = Vec::with_capacity(row_count);
    for label in response.labels {
        match label {
            0 => labels.push(RiskLabel::NotReadmitted),
            1 => labels.push(RiskLabel::Readmitted),
            other => {
                return Err(OracleError::Malformed(format!("unknown label value {other}")));
            }
        }
    }
    Ok(PredictionBatch::new(labels, response.probabilities))
}

#[async_trait]
impl Oracle for HttpOracle {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn predict(&self, rows: &[Record]) -> Result<PredictionBatch, OracleError> {
        let body = rows_to_json(rows);

        let mut attempt = 0;
        loop {
            match self.call_once(&body).await {
                Ok(response) => return parse_response(response, rows.len()),
                // Only transport failures are worth retrying; a malformed
                // payload will be malformed again.
                Err(OracleError::Transport(detail)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %detail, "prediction request failed, retrying");
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use readmit_core::oracle::{OracleError, RiskLabel};
    use readmit_core::record::{FieldValue, Record};

    use super::{parse_response, rows_to_json, PredictResponse};

    fn sample_row() -> Record {
        let mut record = Record::default();
        record.push("race", FieldValue::Text("Caucasian".to_owned()));
        record.push("time_in_hospital", FieldValue::Int(4));
        record.push("age_midpoint", FieldValue::Float(65.0));
        record
    }

    #[test]
    fn rows_serialize_with_typed_cells() {
        let body = rows_to_json(&[sample_row()]);

        assert_eq!(body["rows"][0]["race"], serde_json::json!("Caucasian"));
        assert_eq!(body["rows"][0]["time_in_hospital"], serde_json::json!(4));
        assert_eq!(body["rows"][0]["age_midpoint"], serde_json::json!(65.0));
    }

    #[test]
    fn well_formed_response_parses_into_a_batch() {
        let response = PredictResponse {
            labels: vec![1, 0],
            probabilities: vec![[0.18, 0.82], [0.88, 0.12]],
        };

        let batch = parse_response(response, 2).expect("aligned response");
        assert_eq!(batch.len(), 2);
        let first = batch.result(0).expect("row 0");
        assert_eq!(first.label, RiskLabel::Readmitted);
        assert!((first.probability - 0.82).abs() < f64::EPSILON);
    }

    #[test]
    fn misaligned_response_is_malformed() {
        let response =
            PredictResponse { labels: vec![1], probabilities: vec![[0.2, 0.8], [0.9, 0.1]] };

        let error = parse_response(response, 2).expect_err("length mismatch");
        assert!(matches!(error, OracleError::Malformed(_)));
    }

    #[test]
    fn unknown_label_value_is_malformed() {
        let response = PredictResponse { labels: vec![3], probabilities: vec![[0.5, 0.5]] };

        let error = parse_response(response, 1).expect_err("label out of range");
        assert!(matches!(error, OracleError::Malformed(_)));
    }
}
