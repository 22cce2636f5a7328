#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use renderq_api::config::{AccessList, ServerConfig};
use renderq_api::frontend::WsMessenger;
use renderq_api::router::build_app_router;
use renderq_api::state::AppState;
use renderq_api::ws::WsManager;
use renderq_backend::sdapi::SdApi;
use renderq_core::params::RenderDefaults;
use renderq_queue::{QueueConfig, RenderQueue};

/// Nothing listens here; backend calls fail as unreachable.
pub const DEAD_BACKEND: &str = "http://127.0.0.1:9/sdapi/v1";

/// Allowed group chat.
pub const GROUP: i64 = -1001;
/// Admin user; allowed in direct chats without being listed as a user.
pub const ADMIN: i64 = 9;
/// Known to nobody.
pub const STRANGER: i64 = 77;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(output_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        sd_api_url: DEAD_BACKEND.to_string(),
        sd_webui_path: None,
        sd_start: false,
        delayed_sd_start: false,
        max_job_duration_secs: 600,
        input_timeout_secs: 180,
        output_dir: output_dir.to_path_buf(),
        render_defaults: RenderDefaults {
            model: "v1-5".into(),
            sampler: "Euler a".into(),
            ..RenderDefaults::default()
        },
        access: AccessList {
            user_ids: vec![1, 2],
            group_ids: vec![GROUP],
            admin_user_ids: vec![ADMIN],
        },
        smi_command: "echo".to_string(),
    }
}

/// Build the full application router against the WebUI at `sd_api_url`.
///
/// The queue processor is not started, so submitted jobs stay queued and
/// the snapshot is deterministic.
pub fn build_test_app(sd_api_url: &str, output_dir: &Path) -> (Router, AppState) {
    let mut config = test_config(output_dir);
    config.sd_api_url = sd_api_url.to_string();

    let ws_manager = Arc::new(WsManager::new());
    let sd_api = Arc::new(SdApi::new(sd_api_url));
    let messenger = Arc::new(WsMessenger::new(ws_manager.clone(), output_dir));
    let queue = RenderQueue::new(sd_api.clone(), messenger, None, QueueConfig::default());

    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager,
        queue,
        sd_api,
    };
    (build_app_router(state.clone(), &config), state)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

/// GET as `user_id`, optionally from inside `chat_id`.
pub async fn get_as(app: &Router, uri: &str, user_id: i64, chat_id: Option<i64>) -> Response<Body> {
    let mut request = Request::get(uri).header("x-user-id", user_id.to_string());
    if let Some(chat_id) = chat_id {
        request = request.header("x-chat-id", chat_id.to_string());
    }
    send(app, request.body(Body::empty()).unwrap()).await
}

/// POST a JSON body as `user_id`.
pub async fn post_json(
    app: &Router,
    uri: &str,
    user_id: i64,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user_id.to_string())
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST a single-file multipart body as `user_id`.
pub async fn post_file(
    app: &Router,
    uri: &str,
    user_id: i64,
    field: &str,
    filename: &str,
    data: &[u8],
) -> Response<Body> {
    const BOUNDARY: &str = "renderq-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("x-user-id", user_id.to_string())
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
