//! Health, readiness and metrics endpoints.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::{Value, json};

/// Liveness: the process is up.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness: the database answers.
///
/// ```text
/// GET /ready
/// ```
///
/// # Errors
///
/// Returns `503 Service Unavailable` when the store ping fails.
pub async fn readiness(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.health.ping().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        AppError::unavailable("Database unavailable")
    })?;

    Ok(Json(json!({ "status": "ready" })))
}

/// Prometheus scrape endpoint.
///
/// ```text
/// GET /metrics
/// ```
///
/// # Errors
///
/// Returns `404 Not Found` when no metrics recorder is installed.
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let exporter = state
        .metrics
        .as_ref()
        .ok_or_else(|| AppError::not_found("Metrics are not enabled"))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        exporter.render(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
