use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::gate::traffic_gate;
use super::handlers;
use super::ApiState;

/// Status and health routes are served ungated; everything else is a static
/// file from the configured directory behind the traffic gate.
pub fn create_router(state: Arc<ApiState>) -> Router {
    let files = ServiceBuilder::new()
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            traffic_gate,
        ))
        .service(ServeDir::new(&state.config.serve_dir));

    let status_path = state.config.status_path.clone();

    Router::new()
        .route(&status_path, get(handlers::traffic_status))
        .route("/health", get(handlers::health_check))
        .fallback_service(files)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
