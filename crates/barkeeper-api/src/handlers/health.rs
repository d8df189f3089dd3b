//! Health check handler.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

const STORE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub store: String,
}

/// Report whether the blob store answers a ping.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = match tokio::time::timeout(STORE_CHECK_TIMEOUT, state.store.ping()).await {
        Ok(Ok(())) => "healthy".to_string(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, backend = ?state.store.backend_type(), "Blob store health check failed");
            format!("unhealthy: {}", e)
        }
        Err(_) => {
            tracing::error!("Blob store health check timed out");
            "timeout".to_string()
        }
    };

    let healthy = store == "healthy";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthCheckResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            store,
        }),
    )
}
