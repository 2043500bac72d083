use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use sketchflow_api::background::{resource_guard, session_sweeper};
use sketchflow_api::config::ServerConfig;
use sketchflow_api::router::build_app_router;
use sketchflow_api::state::AppState;
use sketchflow_comfyui::api::ComfyUIApi;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sketchflow_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        comfyui = %config.comfyui_url,
        max_sessions = config.sessions.max_active_sessions,
        "Loaded server configuration",
    );

    // --- State ---
    let engine = Arc::new(ComfyUIApi::new(config.comfyui_url.clone()));
    let state = AppState::new(config.clone(), engine);
    state.store.ensure_dirs().await?;

    // --- Background tasks ---
    let background_cancel = CancellationToken::new();
    let sweeper_handle = tokio::spawn(session_sweeper::run(
        Arc::clone(&state.registry),
        config.sessions.cleanup_interval,
        background_cancel.clone(),
    ));
    let guard_handle = tokio::spawn(resource_guard::run(
        Arc::clone(&state.registry),
        config.guard.check_interval,
        config.guard.thresholds,
        background_cancel.clone(),
    ));
    tracing::info!("Background tasks started (session sweeper, resource guard)");

    // --- Router ---
    let channels = Arc::clone(&state.channels);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(config.host.parse()?, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    background_cancel.cancel();
    let _ = tokio::time::timeout(grace, sweeper_handle).await;
    let _ = tokio::time::timeout(grace, guard_handle).await;
    tracing::info!("Background tasks stopped");

    let ws_count = channels.connection_count().await;
    tracing::info!(ws_count, "Closing remaining push channels");
    channels.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
