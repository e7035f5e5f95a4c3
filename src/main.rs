use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use codecollab_hub::config::{RuntimeConfig, RuntimeFlavor, Settings};
use codecollab_hub::server::{create_app, AppState};
use codecollab_hub::shutdown::GracefulShutdown;
use codecollab_hub::tasks::HeartbeatTask;
use codecollab_hub::telemetry;

fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;

    let runtime = build_runtime(&settings.runtime)?;
    runtime.block_on(run(settings))
}

fn build_runtime(config: &RuntimeConfig) -> Result<tokio::runtime::Runtime> {
    let mut builder = match config.flavor {
        RuntimeFlavor::MultiThread => {
            let mut builder = tokio::runtime::Builder::new_multi_thread();
            if let Some(threads) = config.worker_threads {
                builder.worker_threads(threads.max(1));
            }
            builder
        }
        RuntimeFlavor::CurrentThread => tokio::runtime::Builder::new_current_thread(),
    };

    builder
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
}

async fn run(settings: Settings) -> Result<()> {
    // Initialize tracing
    telemetry::init_tracing(&settings.logging)?;
    tracing::info!(runtime = ?settings.runtime.flavor, "Configuration loaded");

    // Create application state
    let state = AppState::new(settings.clone());
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start heartbeat task in background
    let heartbeat_task = HeartbeatTask::new(
        settings.websocket.clone(),
        state.hub.clone(),
        shutdown_tx.subscribe(),
    );
    let heartbeat_handle = tokio::spawn(async move {
        heartbeat_task.run().await;
    });

    let graceful = GracefulShutdown::new(state.hub.clone(), shutdown_tx, &settings.shutdown);

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown; open sockets are drained before axum stops waiting on them
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            graceful.execute().await;
        })
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    let _ = heartbeat_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
