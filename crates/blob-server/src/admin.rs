//! Admin service: liveness and a summary of what the process is serving.
//!
//! Runs on its own listener, separate from blob traffic, and only when an
//! admin port is configured.

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::ServerResult;
use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub storage_root: String,
    pub entries: usize,
    pub blobs: usize,
}

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Info handler.
pub async fn info_handler(State(state): State<AppState>) -> ServerResult<Json<InfoResponse>> {
    let blobs = state.manifest.blob_store().list().await?.len();
    Ok(Json(InfoResponse {
        name: "blob-server".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        storage_root: state.validator.root().display().to_string(),
        entries: state.manifest.len(),
        blobs,
    }))
}

/// Build the admin router.
pub fn build_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(health_handler))
        .route("/v1/info", get(info_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
