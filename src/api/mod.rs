//! HTTP API for health checks and in-flight status

use crate::config::ApiConfig;
use crate::error::{TransactorError, TransactorResult};
use crate::tx::Sender;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sender: Arc<Sender>,
}

/// Routes exposing the sender's operational status
pub fn router(sender: Arc<Sender>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sending/:msg_id", get(get_sending))
        .route("/in-flight", get(get_in_flight))
        .with_state(AppState { sender })
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, sender: Arc<Sender>) -> TransactorResult<()> {
    let app = router(sender);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TransactorError::Internal(format!("bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| TransactorError::Internal(e.to_string()))
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Whether a message is currently being sent
async fn get_sending(
    State(state): State<AppState>,
    Path(msg_id): Path<String>,
) -> impl IntoResponse {
    let sending = state.sender.is_sending(&msg_id);
    Json(SendingResponse { msg_id, sending })
}

/// Number of messages currently being sent
async fn get_in_flight(State(state): State<AppState>) -> impl IntoResponse {
    Json(InFlightResponse {
        count: state.sender.registry().len(),
    })
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct SendingResponse {
    msg_id: String,
    sending: bool,
}

#[derive(Serialize)]
struct InFlightResponse {
    count: usize,
}
