mod bootstrap;
mod health;
pub mod sessions;

use std::time::Duration;

use anyhow::Result;

use readmit_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use readmit_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let state = bootstrap::bootstrap_with_config(config)?;

    let app = sessions::router(state.clone()).merge(health::router(state.oracle.clone()));

    let address =
        format!("{}:{}", state.config.server.bind_address, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        oracle = state.oracle.name(),
        "readmit-server started"
    );

    let grace = Duration::from_secs(state.config.server.graceful_shutdown_secs);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(
                event_name = "system.server.shutdown_signal",
                "shutdown signal received, draining connections"
            );
            let _ = shutdown_tx.send(true);
        }
    });

    let mut serve_signal = shutdown_rx.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = serve_signal.changed().await;
        });

    // The drain is bounded: once the signal lands, connections get the grace
    // period and no more.
    let mut drain_signal = shutdown_rx;
    tokio::select! {
        result = server => result?,
        _ = async move {
            let _ = drain_signal.changed().await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                grace_secs = grace.as_secs(),
                "graceful shutdown period elapsed, aborting remaining connections"
            );
        }
    }

    tracing::info!(event_name = "system.server.stopping", "readmit-server stopping");

    Ok(())
}
