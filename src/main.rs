/*!
 * Biokey Server
 * Issues biometric-bound identity keys and releases them on a matching sample.
 *
 * Handles:
 * - Registration (extract, hash, issue, wrap)
 * - Biometric verification (fuzzy match, public key release)
 * - Private key recovery (password unwrap)
 */

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use biokey_server::authority::{KeyAuthority, MasterSecret};
use biokey_server::config::{Config, MasterSecretSource};
use biokey_server::enrollment::EnrollmentService;
use biokey_server::extract::EmbeddingExtractor;
use biokey_server::server::{self, AppState};
use biokey_server::store::InMemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Biokey Server");

    let config = Config::from_env().context("invalid configuration")?;
    info!(?config, "configuration loaded");

    let settings = config.enrollment_settings();
    let bind_address = config.bind_address;
    let max_body_bytes = config.max_body_bytes;

    // The authority must hold its master secret before any request is served.
    let authority = KeyAuthority::uninitialized();
    let secret = match config.master_secret {
        MasterSecretSource::Configured(secret) => secret,
        MasterSecretSource::Ephemeral => {
            warn!("no MASTER_SECRET configured; issued keys will not survive a restart");
            MasterSecret::generate()?
        }
    };
    authority.install(secret)?;

    let enrollment = Arc::new(EnrollmentService::new(
        settings,
        Arc::new(authority),
        Arc::new(InMemoryStore::new()),
        Arc::new(EmbeddingExtractor::new(settings.dimension)),
    ));

    let app = server::router(AppState { enrollment }, max_body_bytes);

    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind to {bind_address}"))?;

    info!("Biokey Server listening on {bind_address}");

    axum::serve(listener, app).await.context("server failed")?;

    Ok(())
}
