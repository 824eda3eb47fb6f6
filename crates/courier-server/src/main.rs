//! # Courier Server
//!
//! Direct-messaging backend with realtime delivery.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! courier
//!
//! # Run with a config file at ./courier.toml
//! courier
//!
//! # Run with environment variables
//! COURIER_PORT=8080 COURIER_AUTH_SECRET=... courier
//! ```

mod config;
mod gate;
mod metrics;
mod routes;
mod state;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Router,
};
use courier_store::{SqliteMessageStore, SqliteUserStore};
use state::AppState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    info!("Starting Courier server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Open the store
    let pool = courier_store::connect(&config.database.url).await?;
    courier_store::migrate(&pool).await?;

    let users = Arc::new(SqliteUserStore::new(pool.clone()));
    let messages = Arc::new(SqliteMessageStore::new(pool));

    let state = Arc::new(AppState::new(config.clone(), users, messages));

    // Build router
    let app = Router::new()
        .route(&config.realtime.websocket_path, get(gate::ws_handler))
        .route("/health", get(health_handler))
        .merge(routes::router())
        .layer(cors_layer(config.cors_origin.as_deref())?)
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Courier server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.realtime.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Cross-origin policy for browser clients.
///
/// With a configured origin, credentials (the session cookie) are allowed;
/// without one, the layer is permissive but credential-less.
fn cors_layer(origin: Option<&str>) -> Result<CorsLayer> {
    let layer = match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
        None => CorsLayer::permissive(),
    };
    Ok(layer)
}
