use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use readmit_agent::ConversationEngine;
use readmit_core::config::{AppConfig, LoadOptions};

use super::{block_on, build_oracle, CommandResult};

/// One-shot prediction over a complete answer object, with strict per-field
/// domain validation before the oracle is called.
pub fn run(input: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("predict", "config_validation", error.to_string(), 2);
        }
    };
    let oracle = match build_oracle(&config) {
        Ok(oracle) => oracle,
        Err(error) => return CommandResult::failure("predict", "oracle_setup", error, 2),
    };

    let answers = match read_answers(input) {
        Ok(answers) => answers,
        Err(error) => return CommandResult::failure("predict", "invalid_input", error, 3),
    };

    let engine = ConversationEngine::new(oracle);
    let outcome = match block_on(engine.predict_one(&answers)) {
        Ok(outcome) => outcome,
        Err(error) => return CommandResult::failure("predict", "runtime", error, 4),
    };

    match outcome {
        Ok(result) => CommandResult::success(
            "predict",
            format!(
                "prediction: {} (probability {:.2}%)",
                result.label,
                result.probability * 100.0
            ),
        ),
        Err(error) => CommandResult::failure("predict", "prediction", error.to_string(), 4),
    }
}

fn read_answers(input: Option<&Path>) -> Result<HashMap<String, String>, String> {
    let raw = read_input(input)?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|error| format!("input is not valid JSON: {error}"))?;
    let object = value.as_object().ok_or("input must be a JSON object of field values")?;

    Ok(object
        .iter()
        .map(|(field, cell)| (field.clone(), stringify(cell)))
        .collect())
}

pub(crate) fn read_input(input: Option<&Path>) -> Result<String, String> {
    match input {
        Some(path) => fs::read_to_string(path)
            .map_err(|error| format!("could not read `{}`: {error}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|error| format!("could not read stdin: {error}"))?;
            Ok(buffer)
        }
    }
}

pub(crate) fn stringify(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
