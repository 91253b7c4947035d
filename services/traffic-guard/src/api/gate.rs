use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use tracing::debug;

use crate::tracker::{LimitDecision, TrafficEngine};

use super::ApiState;

pub const LIMIT_EXCEEDED_BODY: &str = "Traffic limit exceeded\n";

/// Denies requests once the monthly ceiling is reached and accounts the
/// bytes of every response that is let through.
pub async fn traffic_gate(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    // Denied requests never reach the recorder; an over-limit month ends here.
    state.engine.reset_if_new_month();

    if let LimitDecision::Deny { used, ceiling } = state.engine.check_limit() {
        debug!(
            used,
            ceiling,
            path = %request.uri().path(),
            "request denied, traffic limit exceeded"
        );
        return limit_exceeded();
    }

    let response = next.run(request).await;
    let mut recorder = UsageRecorder {
        engine: state.engine.clone(),
        header_bytes: header_bytes(&response),
        body_bytes: 0,
    };

    // The recorder travels with the body and records when the body is dropped.
    let (parts, body) = response.into_parts();
    let body = body.map_frame(move |frame| {
        if let Some(data) = frame.data_ref() {
            recorder.record_body(data.len());
        }
        frame
    });

    Response::from_parts(parts, Body::new(body))
}

pub fn limit_exceeded() -> Response {
    (
        StatusCode::FORBIDDEN,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        LIMIT_EXCEEDED_BODY,
    )
        .into_response()
}

/// Records the response once its body is finished or abandoned, counting
/// only the frames that were actually produced.
struct UsageRecorder {
    engine: TrafficEngine,
    header_bytes: u64,
    body_bytes: u64,
}

impl UsageRecorder {
    fn record_body(&mut self, len: usize) {
        self.body_bytes += len as u64;
    }
}

impl Drop for UsageRecorder {
    fn drop(&mut self) {
        self.engine.reset_if_new_month();
        self.engine.add_usage(self.header_bytes + self.body_bytes);
    }
}

fn header_bytes(response: &Response) -> u64 {
    let status = response.status();
    // "HTTP/1.1 200 OK\r\n"
    let status_line = 9 + 4 + status.canonical_reason().map_or(0, str::len) + 2;
    let fields: usize = response
        .headers()
        .iter()
        .map(|(name, value)| name.as_str().len() + 2 + value.len() + 2)
        .sum();
    (status_line + fields + 2) as u64
}
