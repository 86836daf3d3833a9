mod config;
mod metrics;
mod notes;
mod routes;

use anyhow::{Context, Result};
use std::sync::Arc;
use study_extract::{OllamaClient, StudyTasks};
use tracing_subscriber::EnvFilter;

use config::{AppConfig, LogFormat};
use notes::MemoryNoteStore;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(config.log_format);

    let client = OllamaClient::new(
        config.llm.endpoint.clone(),
        config.llm.model.clone(),
        config.llm.timeout(),
    );
    tracing::info!(
        endpoint = %config.llm.endpoint,
        model = %config.llm.model,
        timeout_secs = config.llm.request_timeout_secs,
        api_key_required = config.server.api_key.is_some(),
        "Configured LLM client"
    );

    let state = AppState::new(
        StudyTasks::new(client),
        Arc::new(MemoryNoteStore::new()),
        config.server.api_key.clone(),
    );

    // Build router
    let app = routes::router(state).layer(routes::cors_layer(&config.server.cors_origins));

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    tracing::info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
