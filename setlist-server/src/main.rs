//! setlist-server - Main entry point
//!
//! Serves the setlist REST API, live performance events and the printable
//! setlist export.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use setlist_common::config::{resolve_config, ConfigOverrides};
use setlist_common::db::init_database;
use setlist_server::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for setlist-server
#[derive(Parser, Debug)]
#[command(name = "setlist-server")]
#[command(about = "Setlist management and live performance server")]
#[command(version)]
struct Args {
    /// Address to bind
    #[arg(long, env = "SETLIST_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// SQLite database file or sqlite:// URL
    #[arg(short, long, env = "SETLIST_DATABASE")]
    database: Option<String>,

    /// TOML config file
    #[arg(short, long, env = "SETLIST_CONFIG")]
    config: Option<PathBuf>,

    /// Markdown file served at /tos
    #[arg(long, env = "SETLIST_TOS_PATH")]
    tos_path: Option<PathBuf>,

    /// Seconds before a pending leadership request is approved automatically
    #[arg(long, env = "SETLIST_AUTO_APPROVE_SECS")]
    auto_approve_secs: Option<u64>,

    /// Longest time spent retrying a locked database, in milliseconds
    #[arg(long, env = "SETLIST_DB_MAX_LOCK_WAIT_MS")]
    db_max_lock_wait_ms: Option<u64>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            // DATABASE_URL is honoured for hosted deployments
            database: self
                .database
                .clone()
                .or_else(|| std::env::var("DATABASE_URL").ok()),
            tos_path: self.tos_path.clone(),
            auto_approve_secs: self.auto_approve_secs,
            db_max_lock_wait_ms: self.db_max_lock_wait_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "setlist_server=info,setlist_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting setlist-server v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = resolve_config(args.overrides(), args.config.as_deref())
        .context("Failed to resolve configuration")?;

    info!("Database path: {}", config.database_path.display());
    if !config.tos_path.exists() {
        warn!(
            "Terms of service file {} not found, /tos will return 404",
            config.tos_path.display()
        );
    }

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("✓ Database ready");

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;

    let state = AppState::new(pool, &config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("setlist-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
