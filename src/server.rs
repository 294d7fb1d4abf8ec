//! Liveness HTTP surface.
//!
//! One endpoint: `/health` reports broker connectivity so the scheduler can
//! restart the processor when the bus is unreachable.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::consumer::HealthState;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthState>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.health.is_connected() {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded" })),
        )
    }
}

/// Starts the liveness server; returns once the shutdown token fires.
pub async fn run_server(
    config: Arc<AppConfig>,
    health: Arc<HealthState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = create_app(AppState { health });

    let listener = tokio::net::TcpListener::bind(&config.api_bind_addr).await?;
    info!(addr = %config.api_bind_addr, profile = %config.profile, "liveness server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reflects_broker_connectivity() {
        let shared = Arc::new(HealthState::default());
        let state = AppState {
            health: shared.clone(),
        };

        let (status, body) = health(State(state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.0["status"], "degraded");

        shared.set_connected(true);
        let (status, body) = health(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.0["status"], "ok");
    }
}
