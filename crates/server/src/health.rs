use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use readmit_core::oracle::Oracle;
use readmit_core::record::Record;

#[derive(Clone)]
pub struct HealthState {
    oracle: Arc<dyn Oracle>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub oracle: HealthCheck,
    pub checked_at: String,
}

pub fn router(oracle: Arc<dyn Oracle>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { oracle })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let oracle = oracle_check(state.oracle.as_ref()).await;
    let ready = oracle.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "readmit-server runtime initialized".to_string(),
        },
        oracle,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// Round-trips one fixed row through the oracle. The builtin oracle answers
/// in-process; the HTTP oracle turns this into a live readiness probe.
async fn oracle_check(oracle: &dyn Oracle) -> HealthCheck {
    match oracle.predict(std::slice::from_ref(&probe_row())).await {
        Ok(_) => HealthCheck {
            status: "ready",
            detail: format!("oracle `{}` scored the probe row", oracle.name()),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("oracle probe failed: {error}"),
        },
    }
}

fn probe_row() -> Record {
    let answers: HashMap<String, String> = [
        ("race", "Caucasian"),
        ("gender", "Female"),
        ("time_in_hospital", "3"),
        ("num_lab_procedures", "40"),
        ("num_procedures", "1"),
        ("num_medications", "12"),
        ("number_outpatient", "0"),
        ("number_emergency", "0"),
        ("number_inpatient", "0"),
        ("numchange", "0"),
        ("service_utilization", "0"),
        ("is_emergency_admission", "0"),
        ("admission_category", "elective"),
        ("discharge_to_home", "1"),
        ("discharge_care_level", "home"),
        ("admitted_from_emergency", "0"),
        ("age_midpoint", "55"),
        ("diag_1_range", "Other"),
        ("diag_2_range", "Other"),
        ("diag_3_range", "Other"),
        ("A1Cresult", "0"),
        ("max_glu_serum", "0"),
        ("diabetesMed", "No"),
        ("Cluster", "0"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_owned(), value.to_owned()))
    .collect();

    // The probe schema is fixed at compile time; assembly cannot fail.
    Record::from_collected(&answers).unwrap_or_default()
}
