//! HTTP surface: the `/ws` viewer stream, `/health`, `/status` and the
//! optional dashboard bundle.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{DaemonConfig, HEALTH_ROUTE, STATUS_ROUTE, WS_ROUTE};
use crate::error::{io_err, DaemonError};
use crate::orchestrator::{OrchestratorHandle, WatchStatus};
use crate::protocol::Frame;

#[derive(Debug, Clone)]
pub struct AppState {
    handle: OrchestratorHandle,
    steps_dir: Arc<PathBuf>,
    client_buffer: usize,
}

impl AppState {
    pub fn new(handle: OrchestratorHandle, config: &DaemonConfig) -> Self {
        Self {
            handle,
            steps_dir: Arc::new(config.steps_dir.clone()),
            client_buffer: config.client_buffer.max(1),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    #[serde(flatten)]
    status: WatchStatus,
    steps_dir: String,
}

impl IntoResponse for DaemonError {
    fn into_response(self) -> Response {
        let status = match self {
            DaemonError::ChannelClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route(WS_ROUTE, get(ws_handler))
        .route(HEALTH_ROUTE, get(health))
        .route(STATUS_ROUTE, get(status))
        .with_state(state);

    if let Some(dir) = static_dir {
        tracing::info!(path = %dir.display(), "serving dashboard bundle");
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(TraceLayer::new_for_http()).layer(cors)
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DaemonError> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| io_err("http-server", e))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusBody>, DaemonError> {
    let status = state.handle.status().await?;
    Ok(Json(StatusBody {
        status,
        steps_dir: state.steps_dir.display().to_string(),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One viewer connection.
///
/// Frames are written by a forwarder task draining the client's queue.
/// Incoming messages are read only to notice the close.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Frame>(state.client_buffer);

    let client = match state.handle.connect(tx).await {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!(error = %err, "viewer connection setup failed");
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
    };

    let mut forward = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let inbound = async {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(client = %client, error = %err, "websocket read error");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = &mut forward => {}
        _ = inbound => {}
    }
    forward.abort();
    state.handle.disconnect(client).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use nwwatch_core::{JsonStepSource, RawChange};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::StopPolicy;
    use crate::orchestrator::Orchestrator;
    use crate::watcher::ChangeSource;

    struct Idle;

    impl ChangeSource for Idle {
        fn start(&mut self, _sink: mpsc::UnboundedSender<RawChange>) -> Result<(), DaemonError> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    fn app(dir: &TempDir) -> (Router, OrchestratorHandle) {
        let source = Arc::new(JsonStepSource::new(dir.path()));
        let orchestrator = Orchestrator::new(
            source,
            Box::new(Idle),
            Duration::from_millis(100),
            StopPolicy::Lenient,
        );
        let (handle, _task) = orchestrator.spawn();
        let config = DaemonConfig::new(dir.path());
        (router(AppState::new(handle.clone(), &config), None), handle)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let dir = TempDir::new().expect("tempdir");
        let (app, _handle) = app(&dir);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn status_reflects_core_state() {
        let dir = TempDir::new().expect("tempdir");
        let (app, handle) = app(&dir);
        handle.start_watching().await.expect("start");

        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["watching"], json!(true));
        assert_eq!(body["steps"], json!(0));
        assert_eq!(body["clients"], json!(0));
        assert_eq!(body["stepsDir"], json!(dir.path().display().to_string()));
    }

    #[tokio::test]
    async fn status_after_core_exit_is_unavailable() {
        let dir = TempDir::new().expect("tempdir");
        let (app, handle) = app(&dir);
        handle.shutdown().await;
        tokio::task::yield_now().await;

        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
