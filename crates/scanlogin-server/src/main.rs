//! Scan-to-login server: issues scannable codes, receives the platform's scan
//! events and answers login polls.
//!
//! At startup it:
//!
//! 1. Reads [`config::AppConfig`] from the environment.
//! 2. Wires the platform client, credential cache and session store.
//! 3. Spawns the eviction sweeper.
//! 4. Serves HTTP until SIGINT/SIGTERM, then stops the sweeper.

mod config;
mod correlator;
mod error;
mod login;
mod routes;
mod state;
mod store;
mod sweeper;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::state::AppState;
use crate::sweeper::SessionSweeper;

/// Scan-to-login HTTP server.
#[derive(Parser, Debug)]
#[command(name = "scanlogin-server", about = "Scan-to-login HTTP server")]
struct Args {
    /// Port to listen on; overrides `PORT`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging (controlled via RUST_LOG env var).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    info!(?config, "configuration loaded");

    let state = Arc::new(AppState::from_config(&config).context("platform client setup failed")?);

    let cancel = CancellationToken::new();
    let sweeper = SessionSweeper::new(
        state.sessions.clone(),
        config.sweep_interval,
        config.session_grace,
        cancel.clone(),
    )
    .spawn();

    let app = routes::router(state);
    let addr = format!("0.0.0.0:{}", config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(address = %addr, "scan-to-login server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("server error")?;

    cancel.cancel();
    sweeper.await.context("sweeper task panicked")?;
    info!("shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM, cancelling `cancel` so background tasks
/// wind down alongside the listener.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
    cancel.cancel();
}
