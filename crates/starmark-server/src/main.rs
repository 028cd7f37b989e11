//! Starmark server - HTTP API for chat favorites and previews.

use anyhow::Result;
use axum::Router;
use clap::Parser;
use starmark_server::{config, logging, routes, state};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use config::Config;
use logging::{LogConfig, LogFormat};
use state::AppState;

/// Starmark server - favorite chat messages and preview them.
#[derive(Parser, Debug)]
#[command(name = "starmark-server")]
#[command(about = "HTTP server for chat favorites and previews")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Keep chats in memory instead of the configured chats directory
    #[arg(long)]
    ephemeral: bool,

    /// Enable verbose logging (INFO level for all targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "preview=debug").
    /// Can be specified multiple times. Targets are prefixed with "starmark::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.ephemeral {
        config.chats_dir = None;
    }

    tracing::info!(target: "starmark::startup", "Loaded configuration (port: {})", config.port);

    let state = Arc::new(AppState::new(config.clone()).await?);
    tracing::info!(
        target: "starmark::startup",
        "Opened settings at {} ({} chats)",
        config.db_path.display(),
        state.host.list_chats().await.len()
    );

    let app = Router::new()
        .nest("/api", routes::api_routes())
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "starmark::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Pending debounced writes would otherwise be lost
    state.persister.flush()?;
    tracing::info!(target: "starmark::startup", "Settings flushed, shutting down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "starmark::startup", "Failed to listen for shutdown signal: {}", e);
    }
}
