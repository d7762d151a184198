mod api;
mod cache;
mod config;
mod constants;
mod decode;
mod error;
mod extract;
mod grib;
mod http_client;
mod ingest;
mod storage;
mod transform;
mod types;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use reqwest::Client;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{radar, root};
use crate::config::Config;
use crate::grib::GribDecoder;
use crate::storage::load_cached_payload;
use crate::types::AppState;
use crate::utils::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Arc::new(Config::from_env()?);
    fs::create_dir_all(&cfg.data_dir)
        .await
        .with_context(|| format!("Failed to create {}", cfg.data_dir.display()))?;

    let http = Client::builder()
        .timeout(cfg.fetch_timeout)
        .user_agent("radar-weather-api/1.0")
        .build()
        .context("Failed to build reqwest client")?;

    let latest = Arc::new(RwLock::new(load_cached_payload(&cfg).await?));
    let state = AppState {
        cfg: cfg.clone(),
        http,
        decoder: Arc::new(GribDecoder),
        latest,
        refresh_lock: Arc::new(Mutex::new(())),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/radar", get(radar))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;

    info!("Radar weather API listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
