//! Passkey authentication server.
//!
//! # Usage
//!
//! ```bash
//! # Start Redis and the WebAuthn verification service, then:
//! API_BASE_URL=https://auth.example.com \
//! API_RP_ID=example.com \
//! APP_ID=TEAM123.com.example.app \
//! REDIS_URL=redis://127.0.0.1:6379 \
//! WEBAUTHN_VERIFIER_URL=http://127.0.0.1:4000 \
//! cargo run --bin passkey-auth-server
//! ```

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use passkey_auth::{
    KeyRing, KeyRotationTask, PasskeyOrchestrator, RateLimiter, RedisSharedStore,
    RedisStoreConfig, RemoteWebAuthnVerifier, TokenConfig, system_clock,
};
use passkey_auth_web::{AppState, ServerConfig, router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "passkey_auth=info,passkey_auth_web=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().context("Invalid configuration")?;
    let passkey = config.passkey();
    tracing::info!(
        origin = %passkey.origin,
        rp_id = %passkey.rp_id,
        port = config.port,
        trusted_proxies = config.trusted_proxies.len(),
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        tracing::info!(%addr, "Metrics exporter listening");
    }

    let clock = system_clock();
    let store = RedisSharedStore::connect(RedisStoreConfig::new(&config.redis_url))
        .await
        .context("Failed to connect to Redis")?;

    // Sign nothing until the first key exists
    let keys = Arc::new(KeyRing::new(TokenConfig::default(), clock.clone())?);
    keys.rotate().await.context("Failed to generate initial signing key")?;

    let (rotation, rotation_shutdown) = KeyRotationTask::new(Arc::clone(&keys));
    let rotation_handle = rotation.spawn();

    let verifier = RemoteWebAuthnVerifier::new(&config.verifier_url, passkey.verifier_timeout)?;
    let orchestrator =
        PasskeyOrchestrator::new(passkey, store.clone(), verifier, keys, clock.clone())?;
    let state = AppState::new(
        orchestrator,
        RateLimiter::new(store, clock),
        config.app_id.as_str(),
    )
    .with_trusted_proxies(config.trusted_proxies());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Passkey authentication server listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("HTTP server stopped, stopping key rotation");
    let _ = rotation_shutdown.send(true);
    let _ = rotation_handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
