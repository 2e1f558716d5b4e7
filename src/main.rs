//! Presence Relay - Binary Entry Point

use std::sync::Arc;

use presence_relay::api::{serve, state::AppState};
use presence_relay::auth::{InMemoryUserDirectory, JwtVerifier};
use presence_relay::ingest::InMemoryMessageStore;
use presence_relay::logging::init_tracing;
use presence_relay::{RelayConfig, ServerResult};

#[tokio::main]
async fn main() -> ServerResult<()> {
    let config = RelayConfig::from_env()?;
    init_tracing(config.log_json)?;

    let users = Arc::new(InMemoryUserDirectory::with_users(config.users.clone()));
    if users.is_empty() {
        tracing::warn!("RELAY_USERS is empty, every handshake will be rejected");
    }
    tracing::info!(users = users.len(), "User directory loaded");

    let verifier = Arc::new(JwtVerifier::new(&config.jwt_secret, users)?);
    let store = Arc::new(InMemoryMessageStore::new());

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        origins = ?config.allowed_origins,
        "{} {} listening",
        presence_relay::NAME,
        presence_relay::VERSION
    );

    let state = Arc::new(AppState::new(config, verifier, store));
    serve(listener, state, shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
