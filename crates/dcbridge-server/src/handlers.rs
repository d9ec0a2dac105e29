//! HTTP handlers and task wiring for the bridge.
//!
//! The HTTP side is small: a health check, a JSON status snapshot, and an
//! endpoint that hands hub-side private messages to the session loop.

use crate::config::Config;
use crate::metrics;
use crate::session::{self, HubInput, StatusSnapshot};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dcbridge_transport::IdentServer;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Queue depth for hub input awaiting the session loop.
const HUB_INPUT_CAPACITY: usize = 1024;

/// Shared HTTP state.
pub struct AppState {
    /// Latest bridge snapshot.
    pub status: watch::Receiver<StatusSnapshot>,
    /// Hub input for the session loop.
    pub hub_input: mpsc::Sender<HubInput>,
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/hub/private", post(hub_private_handler))
        .with_state(state)
}

/// Run the bridge and its side services until ctrl-c.
///
/// # Errors
///
/// Returns an error if a configured listener cannot be started.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
    let (hub_tx, hub_rx) = mpsc::channel(HUB_INPUT_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if config.ident.enabled {
        let server = IdentServer::bind(config.ident_addr()?, config.responder())
            .await
            .context("Failed to start ident responder")?;
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "Ident responder stopped");
            }
        });
    }

    if config.http.enabled {
        let addr = config.http_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
        let state = Arc::new(AppState {
            status: status_rx,
            hub_input: hub_tx,
        });

        info!("HTTP endpoints listening on {}", addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app(state)).await {
                error!(error = %e, "HTTP server stopped");
            }
        });
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received ctrl-c"),
            Err(e) => warn!(error = %e, "Failed to listen for ctrl-c"),
        }
        // Receivers may already be gone.
        let _ = shutdown_tx.send(true);
    });

    session::run_bridge(config, hub_rx, status_tx, shutdown_rx).await
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Bridge status handler.
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.status.borrow().clone();
    Json(snapshot)
}

/// Queue hub text for a synthetic user.
async fn hub_private_handler(
    State(state): State<Arc<AppState>>,
    Json(input): Json<HubInput>,
) -> StatusCode {
    match state.hub_input.try_send(input) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Hub input queue full");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(mpsc::error::TrySendError::Closed(_)) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::Response;

    fn state() -> (Arc<AppState>, watch::Sender<StatusSnapshot>, mpsc::Receiver<HubInput>) {
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
        let (hub_tx, hub_rx) = mpsc::channel(1);
        let state = Arc::new(AppState {
            status: status_rx,
            hub_input: hub_tx,
        });
        (state, status_tx, hub_rx)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let body = body_json(health_handler().await.into_response()).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_reflects_snapshot() {
        let (state, status_tx, _hub_rx) = state();
        let mut snapshot = StatusSnapshot {
            connected: true,
            ..StatusSnapshot::default()
        };
        snapshot.bridge.hub_users = 4;
        status_tx.send_replace(snapshot);

        let body = body_json(status_handler(State(state)).await.into_response()).await;
        assert_eq!(body["connected"], true);
        assert_eq!(body["bridge"]["hub_users"], 4);
    }

    #[tokio::test]
    async fn test_hub_private_queues_input() {
        let (state, _status_tx, mut hub_rx) = state();
        let input = HubInput {
            to: "alice".into(),
            text: "hello".into(),
        };

        let code = hub_private_handler(State(Arc::clone(&state)), Json(input.clone())).await;
        assert_eq!(code, StatusCode::ACCEPTED);

        // Capacity is one: the next request is refused until drained.
        let code = hub_private_handler(State(Arc::clone(&state)), Json(input.clone())).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);

        assert_eq!(hub_rx.recv().await, Some(input));
    }
}
