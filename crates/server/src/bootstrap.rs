use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use readmit_agent::remote::HttpOracle;
use readmit_agent::ConversationEngine;
use readmit_core::config::{AppConfig, OracleProvider};
use readmit_core::oracle::{LogisticOracle, Oracle};

use crate::sessions::SessionStore;

/// Everything the HTTP handlers share. Cloning is cheap; session state lives
/// behind the store's lock.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: ConversationEngine,
    pub oracle: Arc<dyn Oracle>,
    pub sessions: SessionStore,
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<AppState> {
    let oracle = build_oracle(&config)?;

    info!(
        event_name = "system.server.oracle_selected",
        oracle = oracle.name(),
        "prediction oracle initialized"
    );

    Ok(AppState {
        engine: ConversationEngine::new(oracle.clone()),
        oracle,
        sessions: SessionStore::default(),
        config: Arc::new(config),
    })
}

fn build_oracle(config: &AppConfig) -> Result<Arc<dyn Oracle>> {
    match config.oracle.provider {
        OracleProvider::Builtin => Ok(Arc::new(LogisticOracle::new())),
        OracleProvider::Http => {
            let oracle = HttpOracle::from_config(&config.oracle)
                .map_err(|error| anyhow::anyhow!("http oracle setup failed: {error}"))?;
            Ok(Arc::new(oracle))
        }
    }
}
