//! Session-scoped conversation API.
//!
//! JSON endpoints:
//! - `POST /api/v1/sessions`                  — open a session (greeting transcript)
//! - `POST /api/v1/sessions/{id}/messages`    — submit one user turn
//! - `POST /api/v1/sessions/{id}/batch`       — score a JSON array of rows
//! - `GET  /api/v1/sessions/{id}/transcript`  — fetch the full transcript
//!
//! Sessions are fully isolated: each holds its own `EngineState`, and the
//! store's lock guarantees at most one turn in flight per session.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use readmit_agent::{EngineState, Message, TurnOutcome};
use readmit_core::record::BatchTable;

use crate::bootstrap::AppState;

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<Uuid, EngineState>>>,
}

impl SessionStore {
    async fn lock(&self) -> tokio::sync::MutexGuard<'_, HashMap<Uuid, EngineState>> {
        self.inner.lock().await
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub transcript: Vec<Message>,
    pub input_placeholder: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub outcome: &'static str,
    pub prediction: Option<PredictionView>,
    pub transcript: Vec<Message>,
    pub input_placeholder: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictionView {
    pub label: u8,
    pub probability: f64,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub message: String,
    pub rows: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiFailure = (StatusCode, Json<ApiError>);

fn not_found(id: Uuid) -> ApiFailure {
    (StatusCode::NOT_FOUND, Json(ApiError { error: format!("unknown session `{id}`") }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/sessions", post(create_session))
        .route("/api/v1/sessions/{id}/messages", post(post_message))
        .route("/api/v1/sessions/{id}/batch", post(post_batch))
        .route("/api/v1/sessions/{id}/transcript", get(get_transcript))
        .with_state(state)
}

pub async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionResponse>) {
    let session = EngineState::new();
    let id = Uuid::new_v4();
    let response = SessionResponse {
        session_id: id,
        transcript: session.transcript().messages().to_vec(),
        input_placeholder: session.input_placeholder(),
    };

    state.sessions.lock().await.insert(id, session);
    info!(event_name = "session.created", session_id = %id, "session opened");

    (StatusCode::CREATED, Json(response))
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiFailure> {
    let mut sessions = state.sessions.lock().await;
    let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;

    let outcome = state.engine.submit_turn(session, &request.text).await;
    let (kind, prediction) = match outcome {
        TurnOutcome::Prompted => ("prompted", None),
        TurnOutcome::Predicted(result) => (
            "predicted",
            Some(PredictionView { label: result.label.as_u8(), probability: result.probability }),
        ),
        TurnOutcome::BatchScored(_) => ("batch_scored", None),
        TurnOutcome::Recovered(_) => ("recovered", None),
        TurnOutcome::SessionComplete => ("session_complete", None),
    };

    Ok(Json(TurnResponse {
        outcome: kind,
        prediction,
        transcript: session.transcript().messages().to_vec(),
        input_placeholder: session.input_placeholder(),
    }))
}

pub async fn post_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<BatchResponse>, ApiFailure> {
    let mut sessions = state.sessions.lock().await;
    let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;

    let table = BatchTable::from_json(&body).map_err(|error| {
        (StatusCode::UNPROCESSABLE_ENTITY, Json(ApiError { error: error.user_message() }))
    })?;

    match state.engine.submit_batch(session, table).await {
        TurnOutcome::BatchScored(scored) => {
            let message = session
                .transcript()
                .last_bot_message()
                .unwrap_or_default()
                .to_string();
            Ok(Json(BatchResponse { message, rows: scored.to_json() }))
        }
        TurnOutcome::Recovered(message) => {
            Err((StatusCode::UNPROCESSABLE_ENTITY, Json(ApiError { error: message })))
        }
        other => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError { error: format!("unexpected batch outcome: {other:?}") }),
        )),
    }
}

pub async fn get_transcript(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TranscriptResponse>, ApiFailure> {
    let sessions = state.sessions.lock().await;
    let session = sessions.get(&id).ok_or_else(|| not_found(id))?;

    Ok(Json(TranscriptResponse { messages: session.transcript().messages().to_vec() }))
}

#[cfg(test)]
mod tests {
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;
    use serde_json::json;
    use uuid::Uuid;

    use readmit_core::config::AppConfig;

    use crate::bootstrap::bootstrap_with_config;
    use crate::sessions::{create_session, get_transcript, post_batch, post_message, TurnRequest};

    fn answers() -> Vec<&'static str> {
        vec![
            "Caucasian",
            "Female",
            "4",
            "43",
            "1",
            "16",
            "0",
            "0",
            "0",
            "0",
            "1",
            "1",
            "emergency",
            "1",
            "home",
            "1",
            "65",
            "390-459 (Circulatory)",
            "240-279 (Endocrine/Metabolic)",
            "Other",
            "1",
            "0",
            "Yes",
            "2",
        ]
    }

    fn row_object() -> serde_json::Value {
        let names = [
            "race",
            "gender",
            "time_in_hospital",
            "num_lab_procedures",
            "num_procedures",
            "num_medications",
            "number_outpatient",
            "number_emergency",
            "number_inpatient",
            "numchange",
            "service_utilization",
            "is_emergency_admission",
            "admission_category",
            "discharge_to_home",
            "discharge_care_level",
            "admitted_from_emergency",
            "age_midpoint",
            "diag_1_range",
            "diag_2_range",
            "diag_3_range",
            "A1Cresult",
            "max_glu_serum",
            "diabetesMed",
            "Cluster",
        ];
        let object: serde_json::Map<String, serde_json::Value> = names
            .iter()
            .zip(answers())
            .map(|(name, value)| ((*name).to_string(), json!(value)))
            .collect();
        serde_json::Value::Object(object)
    }

    fn test_state() -> crate::bootstrap::AppState {
        bootstrap_with_config(AppConfig::default()).expect("builtin bootstrap")
    }

    #[tokio::test]
    async fn new_session_opens_with_the_greeting() {
        let state = test_state();

        let (status, Json(session)) = create_session(State(state)).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(session.transcript.len(), 1);
        assert_eq!(
            session.transcript[0].content,
            "Hello! I'll analyze readmission risk. Let's start!"
        );
        assert_eq!(session.input_placeholder.as_deref(), Some("Please provide **race**:"));
    }

    #[tokio::test]
    async fn full_conversation_reaches_a_prediction() {
        let state = test_state();
        let (_, Json(session)) = create_session(State(state.clone())).await;
        let id = session.session_id;

        let mut last = None;
        for answer in answers() {
            let Json(response) = post_message(
                State(state.clone()),
                Path(id),
                Json(TurnRequest { text: answer.to_string() }),
            )
            .await
            .expect("known session");
            last = Some(response);
        }

        let final_turn = last.expect("at least one turn");
        assert_eq!(final_turn.outcome, "predicted");
        let prediction = final_turn.prediction.expect("prediction view");
        assert!(prediction.label == 0 || prediction.label == 1);
        assert!((0.0..=1.0).contains(&prediction.probability));
        assert!(final_turn.input_placeholder.is_none());

        let message = final_turn.transcript.last().expect("prediction message");
        assert!(message.content.contains("readmission risk"));
        assert!(message.content.contains('%'));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let state = test_state();

        let error = post_message(
            State(state),
            Path(Uuid::new_v4()),
            Json(TurnRequest { text: "Caucasian".to_string() }),
        )
        .await
        .expect_err("no such session");

        assert_eq!(error.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn batch_scores_rows_and_keeps_the_session_usable() {
        let state = test_state();
        let (_, Json(session)) = create_session(State(state.clone())).await;
        let id = session.session_id;

        let Json(response) =
            post_batch(State(state.clone()), Path(id), Json(json!([row_object(), row_object()])))
                .await
                .expect("valid batch");

        assert_eq!(response.message, "Batch predictions complete! ✅");
        let rows = response.rows.as_array().expect("scored rows");
        assert_eq!(rows.len(), 2);
        for row in rows {
            let label = row["Readmission Prediction"].as_i64().expect("label");
            assert!(label == 0 || label == 1);
        }

        // Slot-filling is untouched by the batch turn.
        let Json(turn) = post_message(
            State(state),
            Path(id),
            Json(TurnRequest { text: "Caucasian".to_string() }),
        )
        .await
        .expect("session still live");
        assert_eq!(turn.outcome, "prompted");
    }

    #[tokio::test]
    async fn batch_with_missing_columns_is_unprocessable() {
        let state = test_state();
        let (_, Json(session)) = create_session(State(state.clone())).await;
        let id = session.session_id;

        let mut row = row_object();
        row.as_object_mut().expect("object").remove("gender");

        let error = post_batch(State(state), Path(id), Json(json!([row])))
            .await
            .expect_err("missing column");

        assert_eq!(error.0, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(error.1.error.contains("gender"));
    }

    #[tokio::test]
    async fn transcript_endpoint_returns_full_history() {
        let state = test_state();
        let (_, Json(session)) = create_session(State(state.clone())).await;
        let id = session.session_id;

        post_message(
            State(state.clone()),
            Path(id),
            Json(TurnRequest { text: "Caucasian".to_string() }),
        )
        .await
        .expect("known session");

        let Json(transcript) =
            get_transcript(State(state), Path(id)).await.expect("known session");

        // Greeting, user answer, next-field prompt.
        assert_eq!(transcript.messages.len(), 3);
        assert_eq!(transcript.messages[1].content, "Caucasian");
    }
}
