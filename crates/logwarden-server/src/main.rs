use anyhow::{Context, Result};
use logwarden_server::app;
use logwarden_server::config::ServerConfig;
use logwarden_server::logging;
use logwarden_server::runtime::{build_broker, Background};
use logwarden_server::state::AppState;
use logwarden_storage::SqliteStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  logwarden-server [config.toml]    Start the server (default: config/server.toml)");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.get(1).map(String::as_str) {
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(path) => path.to_string(),
        None => "config/server.toml".to_string(),
    };

    let config = ServerConfig::load(&config_path)?;
    logging::init(config.logging.format)?;
    logwarden_common::id::init(1, 1)?;

    tracing::info!(
        config = %config_path,
        http_port = config.http_port,
        broker = ?config.broker.kind,
        topic = %config.broker.topic,
        group = %config.broker.group_id,
        "Starting logwarden"
    );

    let store = Arc::new(
        SqliteStore::open(&config.database.path())
            .with_context(|| format!("Failed to open database '{}'", config.database.path))?,
    );

    let broker = build_broker(&config.broker)?;
    let background = Background::spawn(store.clone(), broker.broker, &config);
    let shutdown = background.shutdown_token();

    let http_port = config.http_port;
    let state = AppState::new(store, broker.memory, config);
    let app = app::build_http_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP port {http_port}"))?;
    tracing::info!(%addr, "HTTP server listening");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                tracing::info!("Shutdown signal received");
                signal_token.cancel();
            }
            _ = signal_token.cancelled() => {}
        }
    });

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server error");
    }

    background.stop().await?;
    served.context("HTTP server failed")?;
    tracing::info!("logwarden stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
