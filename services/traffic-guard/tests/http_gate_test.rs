use std::fs;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;
use traffic_guard::{
    create_router, AlertDispatcher, ApiState, ManualClock, MemoryStore, SharedStore, StateFile,
    StatusResponse, TrafficEngine, TrafficGuardConfig,
};

const GIB: u64 = 1_073_741_824;

struct Harness {
    router: Router,
    engine: TrafficEngine,
    clock: Arc<ManualClock>,
    _dir: TempDir,
}

fn harness(limit_bytes: u64) -> Harness {
    let dir = tempdir().expect("failed to create temp dir");
    let public = dir.path().join("public");
    fs::create_dir_all(&public).unwrap();
    fs::write(public.join("index.html"), vec![b'a'; 1_000]).unwrap();

    let config = Arc::new(TrafficGuardConfig {
        limit_bytes,
        serve_dir: public,
        state_file: dir.path().join("traffic.json"),
        ..TrafficGuardConfig::default()
    });

    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap(),
    ));
    let engine = TrafficEngine::new(
        0,
        Arc::clone(&store),
        Arc::new(StateFile::new(config.state_file.clone())),
        AlertDispatcher::new(store, Vec::new()),
        &config,
    )
    .with_clock(clock.clone());
    engine.initialize_state();

    let router = create_router(Arc::new(ApiState::new(engine.clone(), config)));
    Harness {
        router,
        engine,
        clock,
        _dir: dir,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn served_files_are_accounted_with_headers() {
    let harness = harness(GIB);

    let (status, body) = get(&harness.router, "/index.html").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 1_000);
    let used = harness.engine.get_usage();
    assert!(used > 1_000, "headers should be counted, got {used}");
    assert!(used < 1_500, "unexpected accounting, got {used}");
}

#[tokio::test]
async fn body_bytes_are_recorded_once_the_body_is_consumed() {
    let harness = harness(GIB);

    let response = harness
        .router
        .clone()
        .oneshot(Request::builder().uri("/index.html").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.engine.get_usage(), 0);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.len(), 1_000);

    let used = harness.engine.get_usage();
    assert!(used > 1_000, "body bytes missing, got {used}");
    assert!(used < 1_500, "unexpected accounting, got {used}");
}

#[tokio::test]
async fn abandoned_body_counts_only_headers() {
    let harness = harness(GIB);

    let response = harness
        .router
        .clone()
        .oneshot(Request::builder().uri("/index.html").body(Body::empty()).unwrap())
        .await
        .unwrap();
    drop(response);

    let used = harness.engine.get_usage();
    assert!(used > 0, "headers should be counted");
    assert!(used < 1_000, "unsent body was counted, got {used}");
}

#[tokio::test]
async fn requests_are_denied_once_ceiling_is_reached() {
    let harness = harness(2_000);

    assert_eq!(get(&harness.router, "/index.html").await.0, StatusCode::OK);
    assert_eq!(get(&harness.router, "/index.html").await.0, StatusCode::OK);
    let used = harness.engine.get_usage();
    assert!(used >= 2_000);

    let response = harness
        .router
        .clone()
        .oneshot(Request::builder().uri("/index.html").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"Traffic limit exceeded\n");

    assert_eq!(harness.engine.get_usage(), used);
    assert!(harness.engine.is_alerted());
}

#[tokio::test]
async fn new_month_reopens_the_gate() {
    let harness = harness(500);
    harness.engine.add_usage(10_000);
    assert_eq!(get(&harness.router, "/index.html").await.0, StatusCode::FORBIDDEN);

    harness
        .clock
        .set(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());

    let (status, _) = get(&harness.router, "/index.html").await;
    assert_eq!(status, StatusCode::OK);
    assert!(harness.engine.get_usage() > 1_000);
    assert_eq!(harness.engine.stored_month(), Some(6));
}

#[tokio::test]
async fn status_endpoint_reports_snapshot_without_counting() {
    let harness = harness(1024 * GIB);
    harness.engine.add_usage(512 * GIB);

    let (status, body) = get(&harness.router, "/traffic/status").await;
    assert_eq!(status, StatusCode::OK);

    let report: StatusResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        report,
        StatusResponse {
            timestamp: Utc
                .with_ymd_and_hms(2024, 5, 20, 12, 0, 0)
                .unwrap()
                .timestamp(),
            total_out_traffic: "512.00 GiB".to_string(),
            limit_traffic: "1.00 TiB".to_string(),
            used_percent: "50.00%".to_string(),
            current_month: "2024-05".to_string(),
        }
    );
    assert_eq!(harness.engine.get_usage(), 512 * GIB);
}

#[tokio::test]
async fn status_and_health_stay_reachable_over_limit() {
    let harness = harness(100);
    harness.engine.add_usage(1_000);

    assert_eq!(get(&harness.router, "/traffic/status").await.0, StatusCode::OK);

    let (status, body) = get(&harness.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["service"], "traffic-guard");
}
