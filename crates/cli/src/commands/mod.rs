pub mod batch;
pub mod chat;
pub mod config;
pub mod doctor;
pub mod predict;

use std::sync::Arc;

use serde::Serialize;

use readmit_agent::remote::HttpOracle;
use readmit_core::config::{AppConfig, OracleProvider};
use readmit_core::oracle::{LogisticOracle, Oracle};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Oracle selection shared by the prediction commands.
pub(crate) fn build_oracle(config: &AppConfig) -> Result<Arc<dyn Oracle>, String> {
    match config.oracle.provider {
        OracleProvider::Builtin => Ok(Arc::new(LogisticOracle::new())),
        OracleProvider::Http => HttpOracle::from_config(&config.oracle)
            .map(|oracle| Arc::new(oracle) as Arc<dyn Oracle>)
            .map_err(|error| error.to_string()),
    }
}

/// Commands are synchronous entry points; each gets its own small runtime
/// for the async engine calls.
pub(crate) fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to initialize async runtime: {error}"))?;
    Ok(runtime.block_on(future))
}
