use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use courtyard_chat::ConnectionRegistry;

use crate::config::ServerConfig;
use crate::store::MemoryMessageStore;

mod routes;

/// Server application state shared by every route.
pub struct AppState {
    /// Live connection registry for the chat runtime
    pub registry: Arc<ConnectionRegistry>,
    /// Message store behind the dispatch seam
    pub store: Arc<MemoryMessageStore>,
    /// Server configuration
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            store: Arc::new(MemoryMessageStore::new()),
            config,
        }
    }
}

/// Start the HTTP server with graceful shutdown on SIGINT/SIGTERM.
pub async fn start(state: Arc<AppState>, listener: tokio::net::TcpListener) -> Result<()> {
    let stop_token = CancellationToken::new();

    let signal_token = stop_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let app = create_router(state);
    let addr = listener.local_addr()?;
    info!("Starting Axum HTTP server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            stop_token.cancelled().await;
            info!("HTTP server received shutdown signal, draining connections");
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

/// Configure CORS.
///
/// With explicit origins configured only those are allowed; otherwise falls
/// back to permissive CORS (suitable for development).
fn configure_cors(config: &ServerConfig) -> CorsLayer {
    use tower_http::cors::AllowOrigin;

    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<_> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if allowed.is_empty() {
        warn!("CORS origins configured but none parsed, falling back to permissive CORS");
        CorsLayer::permissive()
    } else {
        info!(origins = ?allowed, "Configured CORS with explicit allowed origins");
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}

/// Create the Axum router with all routes and middleware.
fn create_router(state: Arc<AppState>) -> Router {
    let cors = configure_cors(&state.config);

    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(readiness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(routes::chat::ws_upgrade))
        .route(
            "/api/v1/groups/:group_id/online",
            get(routes::presence::online_users_handler),
        )
        .route(
            "/api/v1/groups/:group_id/messages",
            post(routes::messages::post_message_handler),
        )
        .route(
            "/api/v1/groups/:group_id/messages/:message_id",
            put(routes::messages::update_message_handler),
        )
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
}

/// Simple health check endpoint (for load balancers).
async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "courtyard-server",
            "version": env!("CARGO_PKG_VERSION"),
            "license": "AGPL-3.0"
        })),
    )
}

/// Readiness check endpoint (for orchestrators).
///
/// The chat runtime holds no external connections of its own, so readiness
/// reports the live registry gauges alongside the ready status.
async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "service": "courtyard-server",
            "version": env!("CARGO_PKG_VERSION"),
            "connected_members": state.registry.metrics().connected_members(),
            "active_groups": state.registry.metrics().active_groups(),
        })),
    )
}

/// Prometheus metrics endpoint.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.registry.metrics().render(),
    )
}
