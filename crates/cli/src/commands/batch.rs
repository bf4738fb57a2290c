use std::path::Path;

use readmit_agent::{ConversationEngine, EngineState, TurnOutcome};
use readmit_core::config::{AppConfig, LoadOptions};
use readmit_core::record::BatchTable;

use super::{block_on, build_oracle, CommandResult};
use super::predict::read_input;

/// Score a JSON array of rows and print the table with the two prediction
/// columns appended.
pub fn run(input: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("batch", "config_validation", error.to_string(), 2);
        }
    };
    let oracle = match build_oracle(&config) {
        Ok(oracle) => oracle,
        Err(error) => return CommandResult::failure("batch", "oracle_setup", error, 2),
    };

    let raw = match read_input(input) {
        Ok(raw) => raw,
        Err(error) => return CommandResult::failure("batch", "invalid_input", error, 3),
    };
    let json: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(json) => json,
        Err(error) => {
            return CommandResult::failure(
                "batch",
                "invalid_input",
                format!("input is not valid JSON: {error}"),
                3,
            );
        }
    };
    let table = match BatchTable::from_json(&json) {
        Ok(table) => table,
        Err(error) => {
            return CommandResult::failure("batch", "invalid_input", error.user_message(), 3);
        }
    };

    let engine = ConversationEngine::new(oracle);
    let mut state = EngineState::new();
    let outcome = match block_on(engine.submit_batch(&mut state, table)) {
        Ok(outcome) => outcome,
        Err(error) => return CommandResult::failure("batch", "runtime", error, 4),
    };

    match outcome {
        TurnOutcome::BatchScored(scored) => {
            let rendered = serde_json::to_string_pretty(&scored.to_json())
                .unwrap_or_else(|_| scored.to_json().to_string());
            CommandResult { exit_code: 0, output: rendered }
        }
        TurnOutcome::Recovered(message) => {
            CommandResult::failure("batch", "prediction", message, 4)
        }
        other => CommandResult::failure(
            "batch",
            "runtime",
            format!("unexpected batch outcome: {other:?}"),
            4,
        ),
    }
}
