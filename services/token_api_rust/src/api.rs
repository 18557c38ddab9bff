use crate::ws::websocket_handler;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use token_pulse_core::broadcast::SnapshotHub;
use token_pulse_core::cache::TieredCache;
use token_pulse_core::query::{QueryError, QueryService, TokenPage, TokenQuery};
use token_pulse_core::refresh::RefreshStats;
use tower_http::cors::CorsLayer;
use tracing::error;

/// Shared handles for every request
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    pub hub: SnapshotHub,
    pub cache: TieredCache,
    pub stats: Arc<RefreshStats>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tokens", get(list_tokens))
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    remote_cache: bool,
    ticks: u64,
    last_snapshot_size: u64,
    last_tick_at: Option<String>,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        remote_cache: state.cache.remote_healthy(),
        ticks: state.stats.ticks(),
        last_snapshot_size: state.stats.last_snapshot_size(),
        last_tick_at: state.stats.last_tick_at().map(|at| at.to_rfc3339()),
    })
}

async fn list_tokens(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TokenPage>, ApiError> {
    let page = state.query.list_tokens(&query).await?;
    Ok(Json(page))
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Failed to serve token listing: {}", self);
        let body = json!({
            "error": "Internal Server Error",
            "details": self.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
