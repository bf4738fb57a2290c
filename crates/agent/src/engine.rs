//! Slot-filling turn loop.
//!
//! The engine is stateless; all session state lives in [`EngineState`], which
//! callers own and pass into each turn. One turn is ever in flight per state,
//! so the loop needs no locking of its own. Every failure that can reach a
//! user is recovered at the turn boundary into a chat message; nothing here
//! aborts a session.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use readmit_core::errors::DomainError;
use readmit_core::oracle::{Oracle, OracleError, PredictionResult};
use readmit_core::record::{BatchTable, Record, ScoredTable};
use readmit_core::schema;

use crate::prompts;
use crate::transcript::Transcript;

/// Everything a session carries between turns.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineState {
    transcript: Transcript,
    collected: HashMap<String, String>,
    #[serde(skip)]
    batch: Option<BatchTable>,
    complete: bool,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            transcript: Transcript::opening(),
            collected: HashMap::new(),
            batch: None,
            complete: false,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn collected(&self) -> &HashMap<String, String> {
        &self.collected
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Stage a batch table; the next turn scores it instead of slot-filling.
    pub fn stage_batch(&mut self, table: BatchTable) {
        self.batch = Some(table);
    }

    pub fn has_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Placeholder for the chat input box: the field the next turn will fill.
    /// Absent once the session is terminal or a batch is staged.
    pub fn input_placeholder(&self) -> Option<String> {
        if self.complete || self.batch.is_some() {
            return None;
        }
        let missing = schema::missing_fields(&self.collected);
        missing.first().map(|field| prompts::input_placeholder(field))
    }
}

/// What a single turn produced, beyond the messages already appended to the
/// transcript.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    /// Value recorded; the bot asked for the next field.
    Prompted,
    /// Completion turn: the oracle ran and the result message was appended.
    Predicted(PredictionResult),
    /// A staged batch was scored and cleared.
    BatchScored(ScoredTable),
    /// A recoverable failure was rendered into the transcript; the session
    /// remains usable.
    Recovered(String),
    /// The session already reached its terminal state.
    SessionComplete,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Drives the dialogue against a prediction oracle. Cheap to clone and share;
/// holds no per-session state.
#[derive(Clone)]
pub struct ConversationEngine {
    oracle: Arc<dyn Oracle>,
}

impl ConversationEngine {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    pub fn oracle_name(&self) -> &'static str {
        self.oracle.name()
    }

    /// One user turn. A staged batch takes precedence over slot-filling: if
    /// one is present it is scored and cleared, and `user_text` is ignored
    /// for that turn.
    pub async fn submit_turn(&self, state: &mut EngineState, user_text: &str) -> TurnOutcome {
        if let Some(table) = state.batch.take() {
            return self.score_batch(state, table).await;
        }

        if state.complete {
            state.transcript.push_bot(prompts::CONVERSATION_COMPLETE);
            return TurnOutcome::SessionComplete;
        }

        let missing = schema::missing_fields(&state.collected);
        let Some(current) = missing.first().copied() else {
            // Collected is full but the completion turn never ran; treat the
            // session as terminal rather than re-predicting.
            state.complete = true;
            state.transcript.push_bot(prompts::CONVERSATION_COMPLETE);
            return TurnOutcome::SessionComplete;
        };

        // The turn's text is recorded verbatim, whatever it says. Coercion
        // and its errors belong to the completion turn.
        state.collected.insert(current.to_owned(), user_text.to_owned());
        state.transcript.push_user(user_text);
        debug!(field = current, "recorded answer");

        let remaining = schema::missing_fields(&state.collected);
        if !remaining.is_empty() {
            state.transcript.push_bot(prompts::next_field_prompt(&remaining));
            return TurnOutcome::Prompted;
        }

        self.completion_turn(state).await
    }

    /// Score a staged batch without touching slot-filling state.
    pub async fn submit_batch(&self, state: &mut EngineState, table: BatchTable) -> TurnOutcome {
        state.batch = None;
        self.score_batch(state, table).await
    }

    /// One-shot prediction over a full answer map, with strict per-field
    /// domain validation. Used by the non-conversational surfaces.
    pub async fn predict_one(
        &self,
        answers: &HashMap<String, String>,
    ) -> Result<PredictionResult, EngineError> {
        for spec in schema::REQUIRED_FIELDS {
            if let Some(raw) = answers.get(spec.name) {
                schema::validate_raw(spec, raw)?;
            }
        }
        let record = Record::from_collected(answers)?;
        let batch = self.oracle.predict(std::slice::from_ref(&record)).await?;
        batch
            .result(0)
            .ok_or_else(|| OracleError::Malformed("empty prediction batch".to_owned()).into())
    }

    async fn completion_turn(&self, state: &mut EngineState) -> TurnOutcome {
        let record = match Record::from_collected(&state.collected) {
            Ok(record) => record,
            Err(error) => {
                // Collected keeps the bad value; the user overwrites it by
                // starting the field over in a follow-up surface.
                let message = error.user_message();
                state.transcript.push_bot(message.clone());
                return TurnOutcome::Recovered(message);
            }
        };

        let batch = match self.oracle.predict(std::slice::from_ref(&record)).await {
            Ok(batch) => batch,
            Err(error) => return self.recover_oracle_failure(state, error),
        };
        let Some(result) = batch.result(0) else {
            return self.recover_oracle_failure(
                state,
                OracleError::Malformed("empty prediction batch".to_owned()),
            );
        };

        info!(
            oracle = self.oracle.name(),
            label = %result.label,
            "completion turn produced a prediction"
        );
        state.transcript.push_bot(prompts::prediction_message(&result));
        state.complete = true;
        TurnOutcome::Predicted(result)
    }

    async fn score_batch(&self, state: &mut EngineState, table: BatchTable) -> TurnOutcome {
        if let Err(error) = table.validate_columns() {
            let message = error.user_message();
            state.transcript.push_bot(message.clone());
            return TurnOutcome::Recovered(message);
        }

        let records = match table.coerce() {
            Ok(records) => records,
            Err(error) => {
                let message = error.user_message();
                state.transcript.push_bot(message.clone());
                return TurnOutcome::Recovered(message);
            }
        };

        let predictions = match self.oracle.predict(&records).await {
            Ok(predictions) => predictions,
            Err(error) => return self.recover_oracle_failure(state, error),
        };

        info!(oracle = self.oracle.name(), rows = records.len(), "batch scored");
        let scored = ScoredTable::new(
            records,
            &predictions.labels_u8(),
            &predictions.positive_probabilities(),
        );
        state.transcript.push_bot(prompts::BATCH_COMPLETE);
        TurnOutcome::BatchScored(scored)
    }

    fn recover_oracle_failure(&self, state: &mut EngineState, error: OracleError) -> TurnOutcome {
        let message = format!("Prediction failed: {error}. Please try again.");
        state.transcript.push_bot(message.clone());
        TurnOutcome::Recovered(message)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use readmit_core::oracle::{
        LogisticOracle, Oracle, OracleError, PredictionBatch, RiskLabel,
    };
    use readmit_core::record::{BatchTable, FieldValue, Record, PREDICTION_COLUMN, PROBABILITY_COLUMN};
    use readmit_core::schema;

    use super::{ConversationEngine, EngineState, TurnOutcome};

    /// Schema-ordered valid answers, one per required field.
    fn answers() -> Vec<(&'static str, &'static str)> {
        vec![
            ("race", "Caucasian"),
            ("gender", "Female"),
            ("time_in_hospital", "4"),
            ("num_lab_procedures", "43"),
            ("num_procedures", "1"),
            ("num_medications", "16"),
            ("number_outpatient", "0"),
            ("number_emergency", "0"),
            ("number_inpatient", "0"),
            ("numchange", "0"),
            ("service_utilization", "1"),
            ("is_emergency_admission", "1"),
            ("admission_category", "emergency"),
            ("discharge_to_home", "1"),
            ("discharge_care_level", "home"),
            ("admitted_from_emergency", "1"),
            ("age_midpoint", "65"),
            ("diag_1_range", "390-459 (Circulatory)"),
            ("diag_2_range", "240-279 (Endocrine/Metabolic)"),
            ("diag_3_range", "Other"),
            ("A1Cresult", "1"),
            ("max_glu_serum", "0"),
            ("diabetesMed", "Yes"),
            ("Cluster", "2"),
        ]
    }

    fn builtin_engine() -> ConversationEngine {
        ConversationEngine::new(Arc::new(LogisticOracle::new()))
    }

    struct CountingOracle {
        inner: LogisticOracle,
        calls: AtomicUsize,
    }

    impl CountingOracle {
        fn new() -> Self {
            Self { inner: LogisticOracle::new(), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Oracle for CountingOracle {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn predict(&self, rows: &[Record]) -> Result<PredictionBatch, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.predict(rows).await
        }
    }

    struct FixedOracle {
        probability: f64,
    }

    #[async_trait]
    impl Oracle for FixedOracle {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn predict(&self, rows: &[Record]) -> Result<PredictionBatch, OracleError> {
            let labels =
                vec![RiskLabel::from_probability(self.probability); rows.len()];
            let probabilities =
                vec![[1.0 - self.probability, self.probability]; rows.len()];
            Ok(PredictionBatch::new(labels, probabilities))
        }
    }

    #[tokio::test]
    async fn first_turn_records_the_first_field_and_prompts_for_the_second() {
        let engine = builtin_engine();
        let mut state = EngineState::new();

        let outcome = engine.submit_turn(&mut state, "Caucasian").await;

        assert_eq!(outcome, TurnOutcome::Prompted);
        assert_eq!(state.collected().get("race"), Some(&"Caucasian".to_owned()));
        assert_eq!(
            state.transcript().last_bot_message(),
            Some("Got it! Now, please provide **gender**.")
        );
    }

    #[tokio::test]
    async fn prompt_wording_switches_exactly_when_one_field_remains() {
        let engine = builtin_engine();
        let mut state = EngineState::new();

        let turns = answers();
        // After the 22nd turn two fields remain; the prompt still names one.
        for (_, value) in &turns[..22] {
            engine.submit_turn(&mut state, value).await;
        }
        assert_eq!(
            state.transcript().last_bot_message(),
            Some("Got it! Now, please provide **diabetesMed**.")
        );

        // After the 23rd turn exactly one remains; the wording switches.
        engine.submit_turn(&mut state, turns[22].1).await;
        assert_eq!(
            state.transcript().last_bot_message(),
            Some("Got it! Now, please provide **all remaining inputs**.")
        );
    }

    #[tokio::test]
    async fn every_answer_is_recorded_regardless_of_content() {
        let engine = builtin_engine();
        let mut state = EngineState::new();

        // Nonsense answers still get recorded; only the completion turn
        // coerces, so after 23 turns all but one field is present.
        for index in 0..23 {
            let outcome = engine.submit_turn(&mut state, &format!("junk-{index}")).await;
            assert_eq!(outcome, TurnOutcome::Prompted);
        }
        assert_eq!(state.collected().len(), 23);
        assert_eq!(schema::missing_fields(state.collected()), vec!["Cluster"]);
    }

    #[tokio::test]
    async fn completion_turn_predicts_exactly_once() {
        let oracle = Arc::new(CountingOracle::new());
        let engine = ConversationEngine::new(oracle.clone());
        let mut state = EngineState::new();

        let turns = answers();
        for (index, (_, value)) in turns.iter().enumerate() {
            let outcome = engine.submit_turn(&mut state, value).await;
            if index < turns.len() - 1 {
                assert_eq!(outcome, TurnOutcome::Prompted);
                assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
            } else {
                assert!(matches!(outcome, TurnOutcome::Predicted(_)));
            }
        }

        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert!(state.is_complete());
    }

    #[tokio::test]
    async fn bad_numeric_on_completion_is_recovered_without_rollback() {
        let oracle = Arc::new(CountingOracle::new());
        let engine = ConversationEngine::new(oracle.clone());
        let mut state = EngineState::new();

        for (field, value) in answers() {
            let supplied = if field == "time_in_hospital" { "a week" } else { value };
            engine.submit_turn(&mut state, supplied).await;
        }

        // All fields stay collected, the oracle was never called, and the
        // failure is a chat message rather than a crash.
        assert_eq!(state.collected().len(), 24);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
        assert!(!state.is_complete());
        assert_eq!(
            state.transcript().last_bot_message(),
            Some("Please re-enter **time_in_hospital** as a number.")
        );
    }

    #[tokio::test]
    async fn high_risk_completion_message_is_verbatim() {
        let engine = ConversationEngine::new(Arc::new(FixedOracle { probability: 0.82 }));
        let mut state = EngineState::new();

        let mut last = TurnOutcome::Prompted;
        for (_, value) in answers() {
            last = engine.submit_turn(&mut state, value).await;
        }

        assert!(matches!(last, TurnOutcome::Predicted(result) if result.label == RiskLabel::Readmitted));
        let message = state.transcript().last_bot_message().expect("prediction message");
        assert!(message.contains("82.00%"));
        assert!(message.contains("- Schedule follow-up care 📅"));
        assert!(message.contains("- Monitor glucose and A1C levels 🩸"));
        assert!(message.contains("- Provide educational resources 📖"));
    }

    #[tokio::test]
    async fn replaying_turns_yields_identical_transcripts() {
        let engine = builtin_engine();
        let mut first = EngineState::new();
        let mut second = EngineState::new();

        for (_, value) in answers() {
            engine.submit_turn(&mut first, value).await;
            engine.submit_turn(&mut second, value).await;
        }

        assert_eq!(first.transcript(), second.transcript());
        assert_eq!(first.transcript().last_bot_message(), second.transcript().last_bot_message());
    }

    #[tokio::test]
    async fn turns_after_completion_get_the_terminal_notice() {
        let engine = builtin_engine();
        let mut state = EngineState::new();

        for (_, value) in answers() {
            engine.submit_turn(&mut state, value).await;
        }
        let before = state.collected().clone();

        let outcome = engine.submit_turn(&mut state, "Hispanic").await;
        assert_eq!(outcome, TurnOutcome::SessionComplete);
        assert_eq!(state.collected(), &before);
        assert_eq!(
            state.transcript().last_bot_message(),
            Some("Conversation complete. Start a new session for another prediction.")
        );
    }

    fn batch_json(rows: usize) -> serde_json::Value {
        let row: serde_json::Map<String, serde_json::Value> = answers()
            .into_iter()
            .map(|(k, v)| (k.to_owned(), serde_json::Value::String(v.to_owned())))
            .collect();
        serde_json::Value::Array(vec![serde_json::Value::Object(row); rows])
    }

    #[tokio::test]
    async fn staged_batch_preempts_slot_filling_for_that_turn() {
        let engine = builtin_engine();
        let mut state = EngineState::new();
        state.stage_batch(BatchTable::from_json(&batch_json(3)).expect("valid json"));

        let outcome = engine.submit_turn(&mut state, "Caucasian").await;

        // The turn scored the batch; no field was recorded and no
        // slot-filling prompt was emitted.
        let TurnOutcome::BatchScored(scored) = outcome else {
            panic!("expected batch outcome");
        };
        assert_eq!(scored.rows.len(), 3);
        assert!(state.collected().is_empty());
        assert!(!state.has_batch());
        assert_eq!(state.transcript().last_bot_message(), Some("Batch predictions complete! ✅"));
    }

    #[tokio::test]
    async fn batch_scoring_appends_both_prediction_columns() {
        let engine = builtin_engine();
        let mut state = EngineState::new();

        let table = BatchTable::from_json(&batch_json(3)).expect("valid json");
        let outcome = engine.submit_batch(&mut state, table).await;

        let TurnOutcome::BatchScored(scored) = outcome else {
            panic!("expected batch outcome");
        };
        for row in &scored.rows {
            let label = row.get(PREDICTION_COLUMN).expect("label column");
            assert!(matches!(label, FieldValue::Int(0 | 1)));
            let probability = row
                .get(PROBABILITY_COLUMN)
                .and_then(|value| value.as_f64())
                .expect("probability column");
            assert!((0.0..=1.0).contains(&probability));
        }
    }

    #[tokio::test]
    async fn batch_with_missing_column_is_rejected_whole() {
        let oracle = Arc::new(CountingOracle::new());
        let engine = ConversationEngine::new(oracle.clone());
        let mut state = EngineState::new();

        let mut json = batch_json(2);
        json[1].as_object_mut().expect("object").remove("gender");
        let table = BatchTable::from_json(&json).expect("valid json");

        let outcome = engine.submit_batch(&mut state, table).await;
        assert!(matches!(outcome, TurnOutcome::Recovered(ref message) if message.contains("gender")));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn batch_coercion_failure_names_the_row() {
        let engine = builtin_engine();
        let mut state = EngineState::new();

        let mut json = batch_json(2);
        json[1]["num_medications"] = serde_json::json!("several");
        let table = BatchTable::from_json(&json).expect("valid json");

        let outcome = engine.submit_batch(&mut state, table).await;
        assert!(matches!(
            outcome,
            TurnOutcome::Recovered(ref message)
                if message.contains("Row 1") && message.contains("num_medications")
        ));
    }

    #[tokio::test]
    async fn predict_one_validates_domains_strictly() {
        let engine = builtin_engine();

        let mut full: HashMap<String, String> =
            answers().into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        let result = engine.predict_one(&full).await.expect("valid answers");
        assert_eq!(result.label, RiskLabel::from_probability(result.probability));

        // Out-of-domain values are rejected before any oracle call.
        full.insert("time_in_hospital".to_owned(), "99".to_owned());
        assert!(engine.predict_one(&full).await.is_err());
    }

    #[tokio::test]
    async fn input_placeholder_tracks_the_next_missing_field() {
        let engine = builtin_engine();
        let mut state = EngineState::new();

        assert_eq!(state.input_placeholder(), Some("Please provide **race**:".to_owned()));
        engine.submit_turn(&mut state, "Caucasian").await;
        assert_eq!(state.input_placeholder(), Some("Please provide **gender**:".to_owned()));

        for (_, value) in &answers()[1..] {
            engine.submit_turn(&mut state, value).await;
        }
        assert_eq!(state.input_placeholder(), None);
    }
}
