// Axum request handlers: translate client HTTP requests into catalog,
// registry, and stream operations.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::catalog::DescriptorCatalog;
use crate::controller;
use crate::registry::SwarmRegistry;
use crate::stream::{self, error_response};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SwarmRegistry>,
    pub catalog: Arc<dyn DescriptorCatalog>,
}

/// Build the streaming router. The catch-all `/{id}/{file_index}` route
/// comes last so the named routes keep precedence.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/active", get(list_active))
        .route("/activate/{id}", post(activate))
        .route("/deactivate/{id}", post(deactivate))
        .route("/{id}/{file_index}", get(stream_file))
        .with_state(state)
}

pub struct StreamServer {
    port: u16,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl StreamServer {
    /// Bind to `addr` (port 0 for an ephemeral port) and serve in the
    /// background, returning a handle.
    pub async fn start(addr: &str, state: AppState) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = router(state);
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        info!("stream server listening on port {}", port);
        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Shutdown the server gracefully.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// GET /active - list active sessions.
async fn list_active(State(state): State<AppState>) -> Response {
    let sessions = controller::list_active_summaries(&state.registry);
    (
        StatusCode::OK,
        Json(json!({ "success": true, "data": sessions })),
    )
        .into_response()
}

/// POST /activate/{id} - activate a catalog descriptor for streaming.
async fn activate(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(locator) = state.catalog.resolve_descriptor(&id) else {
        return error_response(StatusCode::NOT_FOUND, "descriptor not found");
    };

    match controller::activate_by_id(&state.registry, &id, &locator).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": summary })),
        )
            .into_response(),
        Err(e) => {
            error!("activation failed for {}: {}", id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// POST /deactivate/{id} - tear down an active session.
async fn deactivate(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if controller::deactivate_by_id(&state.registry, &id) {
        (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "session deactivated" })),
        )
            .into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "session not active")
    }
}

/// GET /{id}/{file_index} - stream file bytes with Range support.
async fn stream_file(
    State(state): State<AppState>,
    Path((id, file_index)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    // A non-numeric index is just an unknown file.
    let Ok(file_index) = file_index.parse::<usize>() else {
        return error_response(StatusCode::NOT_FOUND, "file not found");
    };

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    stream::serve(&state.registry, &id, file_index, range).await
}
