// SPDX-License-Identifier: PMPL-1.0-or-later
//! PolyConn API server binary
//!
//! Reads the `ConnectorConfig` section from `POLYCONN_CONFIG` (default
//! `appsettings.json`), or from `POLYCONN_*` variables when that file does
//! not exist, and serves the configured backend over HTTP.

use std::path::Path;

use anyhow::Context;
use polyconn_api::{ApiConfig, AppState};
use polyconn_storage::{ConfigSection, ConnectorConfig};

const DEFAULT_SETTINGS: &str = "appsettings.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = std::env::var("POLYCONN_CONFIG").unwrap_or_else(|_| DEFAULT_SETTINGS.into());
    let section = if Path::new(&settings).exists() {
        tracing::info!("Reading connector configuration from {}", settings);
        ConfigSection::from_json_file(&settings)
            .with_context(|| format!("failed to read {settings}"))?
    } else {
        tracing::info!("{} not found, reading POLYCONN_* variables", settings);
        ConfigSection::from_env("POLYCONN")
    };

    let connector = ConnectorConfig::from_section(&section).context("invalid connector configuration")?;
    let state = AppState::from_config(&connector)?;
    let config = ApiConfig::from_env();

    tracing::info!(
        "Starting PolyConn API server on {}:{} ({})",
        config.host,
        config.port,
        connector.kind()
    );

    polyconn_api::serve(config, state).await?;

    Ok(())
}
