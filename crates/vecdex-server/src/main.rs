//! Vecdex Server - REST API for vector index management.

use clap::Parser;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vecdex_core::{VecdexConfig, VecdexService};
use vecdex_server::{build_router, AppState};

/// Vecdex Server - vector index management over a Redis-Stack-compatible
/// backend.
#[derive(Parser, Debug)]
#[command(name = "vecdex-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "vecdex.toml", env = "VECDEX_CONFIG")]
    config: String,

    /// Bind host override.
    #[arg(long, env = "VECDEX_SERVER__HOST")]
    host: Option<String>,

    /// Bind port override.
    #[arg(short, long, env = "VECDEX_SERVER__PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = VecdexConfig::load_from_path(&args.config)
        .map_err(|e| anyhow::anyhow!("failed to load config from '{}': {e}", args.config))?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("starting Vecdex server...");

    let service = Arc::new(VecdexService::connect(config.clone()).await?);
    let state = Arc::new(AppState::new(service, &config));

    let app = build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Vecdex server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
