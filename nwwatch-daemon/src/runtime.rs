use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use nwwatch_core::JsonStepSource;

use crate::config::{validate_watch_root, DaemonConfig, LogFormat};
use crate::error::{io_err, DaemonError};
use crate::orchestrator::{Orchestrator, OrchestratorHandle};
use crate::server::{self, AppState};
use crate::watcher::NotifyChangeSource;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    init_tracing(config.log_format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon until ctrl-c.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    run_until(config, shutdown_signal()).await
}

/// Validate the steps folder, bind, and serve until `shutdown` resolves.
pub async fn run_until(
    config: DaemonConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DaemonError> {
    validate_watch_root(&config.steps_dir)?;
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|e| io_err(config.bind.to_string(), e))?;
    serve_on(listener, config, shutdown).await
}

/// Wire the core to a real folder watch and serve on an already-bound listener.
pub async fn serve_on(
    listener: TcpListener,
    config: DaemonConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DaemonError> {
    validate_watch_root(&config.steps_dir)?;

    let source = Arc::new(JsonStepSource::new(&config.steps_dir));
    let changes = NotifyChangeSource::new(&config.steps_dir);
    let orchestrator = Orchestrator::new(
        source,
        Box::new(changes),
        config.debounce,
        config.stop_policy,
    );
    let (handle, core_task) = start_core(orchestrator).await?;

    let addr = listener
        .local_addr()
        .map_err(|e| io_err("http-listener", e))?;
    tracing::info!(
        %addr,
        steps_dir = %config.steps_dir.display(),
        debounce_ms = config.debounce.as_millis() as u64,
        "nwwatch listening",
    );

    let app = server::router(
        AppState::new(handle.clone(), &config),
        config.static_dir.as_deref(),
    );

    // Closing the core drops every viewer queue, which ends the open
    // WebSocket writers so graceful shutdown is not held up by them.
    let stopping = handle.clone();
    let served = server::serve(listener, app, async move {
        shutdown.await;
        tracing::info!("shutting down");
        if let Err(err) = stopping.stop_watching().await {
            tracing::warn!(error = %err, "stop watching during shutdown failed");
        }
        stopping.shutdown().await;
    })
    .await;

    handle.shutdown().await;
    handle_join("orchestrator", core_task.await.map(Ok))?;
    served
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c, shutting down daemon"),
        Err(err) => {
            tracing::error!(error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    }
}

/// Spawn the core loop and begin watching. A failed start takes the loop
/// down with it.
async fn start_core(
    orchestrator: Orchestrator,
) -> Result<(OrchestratorHandle, JoinHandle<()>), DaemonError> {
    let (handle, core_task) = orchestrator.spawn();
    if let Err(err) = handle.start_watching().await {
        handle.shutdown().await;
        handle_join("orchestrator", core_task.await.map(Ok))?;
        return Err(err);
    }
    Ok((handle, core_task))
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
