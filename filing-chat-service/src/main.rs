use anyhow::Context;
use filing_chat_service::{
    AppState, ServiceConfig, SessionSweeper, build_router, spawn_expiry_listener,
    telemetry::init_tracing,
};
use filing_dialogue::{Collaborators, DialogueMachine, InMemorySessionStorage};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON tracing
    init_tracing();

    let config = ServiceConfig::load().context("Failed to load configuration")?;
    info!(
        extraction_url = %config.endpoints.extraction_url,
        analysis_url = %config.endpoints.analysis_url,
        feedback_url = %config.endpoints.feedback_url,
        filings_dir = %config.filings_dir.display(),
        "Configuration resolved"
    );

    let collaborators = Collaborators::http(config.endpoints.clone());
    let session_storage = Arc::new(InMemorySessionStorage::new());
    info!(
        idle_secs = config.session_idle.as_secs(),
        "Using in-memory session storage"
    );

    let (app_state, expired) = AppState::new(
        DialogueMachine::new(config.dialogue.clone()),
        collaborators,
        session_storage.clone(),
    );
    spawn_expiry_listener(app_state.runner.clone(), expired);
    let sweeper = SessionSweeper::new(app_state.clone(), session_storage, config.session_idle);
    tokio::spawn(sweeper.run());

    let app = build_router(app_state, &config.filings_dir);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
