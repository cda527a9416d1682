//! # Serve Subcommand
//!
//! Startup sequence:
//!
//! 1. **Load configuration**: YAML file, then `--host`/`--port` overrides.
//! 2. **Validate authorization**: policy rules and credentials.
//! 3. **Open storage**: sweep staging files, rebuild the index, drop orphans.
//! 4. **Bind and serve**: until Ctrl-C or SIGTERM, then drain in-flight requests.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sar_api::state::AppState;
use sar_store::ArtefactStore;
use tokio::net::TcpListener;

/// Arguments for `sar serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Configuration file (defaults to ./sar.yaml when present).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Port to listen on, overriding `server.port`.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to listen on, overriding `server.host`.
    #[arg(long)]
    pub host: Option<String>,
}

/// Run the registry until shutdown.
pub async fn run_serve(args: &ServeArgs) -> Result<u8> {
    let mut config = crate::load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }

    let authorization = config
        .authorization()
        .context("invalid authorization configuration")?;
    tracing::info!(
        enabled = authorization.policy.is_enabled(),
        rules = authorization.policy.rules().len(),
        principals = authorization.credentials.len(),
        "authorization loaded"
    );

    let (store, report) = ArtefactStore::open_with_report(config.storage.root.clone())
        .await
        .with_context(|| format!("failed to open storage root {}", config.storage.root.display()))?;
    if report.skipped > 0 {
        tracing::warn!(skipped = report.skipped, "some index entries could not be loaded");
    }

    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, root = %store.root().display(), artefacts = store.index().len(), "registry listening");

    let app = sar_api::app(AppState::new(store, authorization));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("registry stopped");
    Ok(0)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
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
    tracing::info!("shutdown requested");
}
