//! Hellocast server - campaign engine and HTTP API.
//!
//! Starts the transport session's event task (which connects, surfaces QR
//! challenges and reconnects on drops), wires the dispatcher on top of it
//! and serves the HTTP API until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hellocast::render::FontCatalog;
use hellocast::transport::{dev::DevConnector, FileCredentialStore};
use hellocast::web::{router, AppState};
use hellocast::{Config, Dispatcher, FlyerStorage, MemoryRepository, Repository, Session};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        app_url = %config.app_url,
        data_dir = %config.data_dir,
        compose_delay_ms = ?config.compose_delay_ms,
        "config_loaded"
    );

    // Start the transport session
    let store = Arc::new(FileCredentialStore::new(&config.credentials_path));
    let session = Session::spawn(Arc::new(DevConnector), store, &config);
    info!("session_task_started");

    // Wire the dispatcher
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&repo),
        Arc::clone(&session),
        FlyerStorage::new(&config.data_dir),
        FontCatalog::new(config.font_dir.as_deref()),
        config.app_url.clone(),
    ));

    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        dispatcher,
        session,
        repo,
    };

    // Bind to address
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("server_shutting_down");
}
