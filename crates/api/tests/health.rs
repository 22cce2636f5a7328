//! Integration tests for the health check, backend listings and general
//! HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, get_as, DEAD_BACKEND, STRANGER};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Test: GET /health reports backend reachability
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_ok_when_backend_answers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sdapi/v1/progress"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "progress": 0.0, "eta_relative": 0.0 })),
        )
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_test_app(&format!("{}/sdapi/v1", server.uri()), dir.path());

    let response = get(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["backend_healthy"], true);
    assert_eq!(json["queue_length"], 0);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn health_is_degraded_without_backend() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_test_app(DEAD_BACKEND, dir.path());

    let json = body_json(get(&app, "/health").await).await;

    assert_eq!(json["status"], "degraded");
    assert_eq!(json["backend_healthy"], false);
}

// ---------------------------------------------------------------------------
// Test: backend listings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn samplers_are_listed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sdapi/v1/samplers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "name": "Euler a", "aliases": ["k_euler_a"] },
            { "name": "DPM++ 2M", "aliases": [] }
        ])))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_test_app(&format!("{}/sdapi/v1", server.uri()), dir.path());

    let response = get(&app, "/api/v1/backend/samplers").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["data"],
        serde_json::json!(["Euler a", "DPM++ 2M"])
    );
}

#[tokio::test]
async fn listing_without_backend_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_test_app(DEAD_BACKEND, dir.path());

    let response = get(&app, "/api/v1/backend/models").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "BACKEND_UNAVAILABLE");
}

// ---------------------------------------------------------------------------
// Test: GPU status report
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gpu_status_returns_command_output() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_test_app(DEAD_BACKEND, dir.path());

    let response = get_as(&app, "/api/v1/backend/smi", 1, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["data"].is_string());
}

#[tokio::test]
async fn gpu_status_requires_allowed_user() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_test_app(DEAD_BACKEND, dir.path());

    assert_eq!(
        get_as(&app, "/api/v1/backend/smi", STRANGER, None).await.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(get(&app, "/api/v1/backend/smi").await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_gpu_tool_is_an_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let (_, mut state) = build_test_app(DEAD_BACKEND, dir.path());
    let mut config = (*state.config).clone();
    config.smi_command = "renderq-no-such-command".into();
    state.config = std::sync::Arc::new(config.clone());
    let app = renderq_api::router::build_app_router(state, &config);

    let response = get_as(&app, "/api/v1/backend/smi", 1, None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["code"], "INTERNAL_ERROR");
}

// ---------------------------------------------------------------------------
// Test: generic HTTP behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_test_app(DEAD_BACKEND, dir.path());

    let response = get(&app, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_test_app(DEAD_BACKEND, dir.path());

    let response = get(&app, "/api/v1/queue").await;

    let id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(id.to_str().unwrap().len(), 36, "x-request-id should be a UUID");
}

#[tokio::test]
async fn written_outputs_are_served() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sd-image-1-2-0.png"), b"png bytes").unwrap();
    let (app, _) = build_test_app(DEAD_BACKEND, dir.path());

    let response = get(&app, "/outputs/sd-image-1-2-0.png").await;

    assert_eq!(response.status(), StatusCode::OK);
}
