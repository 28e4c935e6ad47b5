//! Local HTTP server exposing the message port.
//!
//! The browser extension posts its messages here instead of to an in-browser
//! background worker.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/message` | Handle one port message, reply `{success, data \| error}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Handled failures still answer `200` with `success: false`; only a body
//! that is not JSON is rejected by the framework.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so extension pages and
//! content scripts on any quiz host can reach the server.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::port::{MessagePort, Reply};

/// Starts the message-port server on `[server].bind`.
///
/// Runs until ctrl-c; in-flight indexing runs are cancelled on shutdown.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let port = Arc::new(MessagePort::from_config(config)?);
    let shutdown = port.shutdown_token();
    let app = router(port);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "message port listening");
    println!("Message port listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// Routes and CORS policy, without binding.
pub fn router(port: Arc<MessagePort>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/message", post(handle_message))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(port)
}

// ============ POST /message ============

async fn handle_message(
    State(port): State<Arc<MessagePort>>,
    Json(message): Json<serde_json::Value>,
) -> Json<Reply> {
    Json(port.handle_value(message).await)
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
