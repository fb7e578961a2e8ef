use anyhow::{Context, Result};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use grantor::api::{create_oauth_router, ApiState};
use grantor::config::{self, GrantorConfig};
use grantor::credentials::CredentialStore;
use grantor::crypto::CredentialCipher;
use grantor::oauth::{run_state_sweeper, StateStore, TokenClient, TokenLifecycleManager};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grantor=info".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => config::load_config(&path)?,
        None => GrantorConfig::default(),
    };

    let (current_key, previous_key) = config::encryption_keys_from_env()?;
    let cipher = CredentialCipher::new(&current_key, previous_key.as_deref())
        .context("Invalid encryption key configuration")?;

    let store = Arc::new(
        CredentialStore::new(&config.storage.db_path, cipher)
            .context("Failed to open credential store")?,
    );

    let states = StateStore::new(config.oauth.state_ttl_seconds);
    tokio::spawn(run_state_sweeper(
        states.clone(),
        config.oauth.sweep_interval_seconds,
    ));

    let manager = Arc::new(TokenLifecycleManager::new(
        store,
        states,
        TokenClient::new(config.oauth.http_timeout_seconds)?,
        config.server.base_url.clone(),
    ));

    let app = create_oauth_router(ApiState { manager }).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    info!(addr = %config.server.bind_addr, "Grantor listening");

    axum::serve(listener, app).await?;

    Ok(())
}
