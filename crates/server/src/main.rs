use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audiograb_core::{load_config, validate_config, DownloadEngine, TokioProcessLauncher};
use audiograb_server::api::create_router;
use audiograb_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting audiograb {}", VERSION);

    // Config file is optional, environment variables alone are enough
    let config_path = std::env::var("AUDIOGRAB_CONFIG").ok().map(PathBuf::from);
    match &config_path {
        Some(path) => info!("Loading configuration from {:?}", path),
        None => info!("No AUDIOGRAB_CONFIG set, using defaults and environment"),
    }
    let config = load_config(config_path.as_deref()).with_context(|| {
        format!("Failed to load config from {:?}", config_path)
    })?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Download root: {:?}", config.storage.base_dir);
    info!("Admin download dir: {:?}", config.storage.admin_dir());
    info!("Cleanup interval: {}s", config.cleanup.interval_secs);

    // Storage roots must exist before the sweeper first lists them
    for dir in [config.storage.base_dir.clone(), config.storage.admin_dir()] {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
    }

    // Create download engine
    let engine = Arc::new(DownloadEngine::new(
        &config,
        Arc::new(TokioProcessLauncher::new()),
    ));
    engine.start();
    info!("Download engine started");

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&engine)));
    info!("Using authenticator: {}", state.authenticator().method_name());

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Stopping the engine on the signal ends open progress streams,
    // otherwise graceful shutdown would wait for every download.
    let shutdown_engine = Arc::clone(&engine);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Server shutting down...");
            shutdown_engine.stop();
        })
        .await
        .context("Server error")?;

    info!("Download engine stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
