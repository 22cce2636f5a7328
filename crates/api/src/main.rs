use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use renderq_backend::sdapi::SdApi;
use renderq_backend::supervisor::ProcessSupervisor;
use renderq_backend::BackendSupervisor;
use renderq_queue::RenderQueue;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use renderq_api::config::ServerConfig;
use renderq_api::frontend::{announce_startup, WsMessenger};
use renderq_api::router::build_app_router;
use renderq_api::state::AppState;
use renderq_api::ws;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "renderq_api=debug,renderq_queue=debug,renderq_backend=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        sd_api_url = %config.sd_api_url,
        allowed_users = config.access.user_ids.len(),
        allowed_groups = config.access.group_ids.len(),
        "Loaded server configuration",
    );

    // --- Stable Diffusion backend ---
    let sd_api = Arc::new(SdApi::new(config.sd_api_url.clone()));
    let supervisor: Option<Arc<dyn BackendSupervisor>> = match &config.sd_webui_path {
        Some(script) if config.sd_start => {
            let supervisor = ProcessSupervisor::new(sd_api.clone(), script.clone());
            Some(Arc::new(supervisor) as Arc<dyn BackendSupervisor>)
        }
        _ => {
            tracing::info!("Stable Diffusion start is disabled");
            None
        }
    };

    if let Some(supervisor) = &supervisor {
        if config.delayed_sd_start {
            tracing::info!("Stable Diffusion start delayed until first request");
        } else if let Err(e) = supervisor.ensure_running().await {
            tracing::error!(error = %e, "Stable Diffusion start failed");
            return ExitCode::FAILURE;
        }
    }

    // --- WebSocket frontend ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_cancel = CancellationToken::new();
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager), heartbeat_cancel.clone());
    let messenger = Arc::new(WsMessenger::new(
        Arc::clone(&ws_manager),
        config.output_dir.clone(),
    ));

    announce_startup(messenger.as_ref(), &config.access.admin_user_ids).await;

    // --- Queue ---
    let queue = RenderQueue::new(sd_api.clone(), messenger, supervisor, config.queue_config());
    let processor = queue.start();

    // A fatal processor error stops the server too.
    let stop = CancellationToken::new();
    let processor_stop = stop.clone();
    let processor_handle = tokio::spawn(async move {
        let result = processor.await;
        processor_stop.cancel();
        result
    });

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        queue: Arc::clone(&queue),
        sd_api,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(stop))
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    queue.shutdown();
    let exit = match tokio::time::timeout(Duration::from_secs(10), processor_handle).await {
        Ok(Ok(Ok(Ok(())))) => ExitCode::SUCCESS,
        Ok(Ok(Ok(Err(e)))) => {
            tracing::error!(error = %e, "Queue processor stopped on a fatal error");
            ExitCode::FAILURE
        }
        Ok(Ok(Err(e))) | Ok(Err(e)) => {
            tracing::error!(error = %e, "Queue processor task failed");
            ExitCode::FAILURE
        }
        Err(_) => {
            tracing::warn!("Queue processor did not stop in time");
            ExitCode::FAILURE
        }
    };
    tracing::info!(pending = queue.len(), "Queue processor stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_cancel.cancel();
    let _ = heartbeat_handle.await;

    tracing::info!("Graceful shutdown complete");
    exit
}

/// Wait for SIGINT, SIGTERM or `stop` to initiate graceful shutdown.
async fn shutdown_signal(stop: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = stop.cancelled() => {
            tracing::info!("Queue processor stopped, shutting down");
        }
    }
}
