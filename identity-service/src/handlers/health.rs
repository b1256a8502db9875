use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::AppState;

/// Service health, including store connectivity
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Store unreachable")
    ),
    tag = "Observability"
)]
pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}

/// Readiness: store reachable and at least one provider registered
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Ready to serve auth traffic"),
        (status = 503, description = "Store unreachable or no provider registered")
    ),
    tag = "Observability"
)]
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable
    })?;

    let providers = state.registry.registered();
    if providers.is_empty() {
        tracing::error!("Readiness failed: no identity provider registered");
        return Err(AppError::ServiceUnavailable);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "providers": providers,
    })))
}
