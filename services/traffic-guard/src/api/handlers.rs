use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::debug;

use super::types::{HealthResponse, StatusResponse};
use super::ApiState;

pub async fn traffic_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let snapshot = state.engine.snapshot();
    debug!(
        bytes_used = snapshot.bytes_used,
        ceiling = snapshot.ceiling,
        "traffic status requested"
    );
    Json(StatusResponse::from(&snapshot))
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "traffic-guard".to_string(),
    })
}
