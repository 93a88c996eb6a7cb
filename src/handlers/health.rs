use axum::{extract::State, http::StatusCode, Json};
use crate::{models::HealthResponse, AppState};
use tracing::{debug, warn};

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse::new("ok", "Server is running"))
}

/// Readiness check endpoint. Without a JWT secret or a working document
/// access check every handshake would be refused, so the relay doesn't report
/// ready.
pub async fn ready_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    debug!("Readiness check requested");
    if state.config.jwt_secret.is_none() {
        warn!("Readiness check failed: no JWT secret configured");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::new("unavailable", "JWT secret not configured")),
        );
    }
    if !state.access.is_available() {
        warn!("Readiness check failed: document access unavailable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::new("unavailable", "Document access unavailable")),
        );
    }
    (StatusCode::OK, Json(HealthResponse::new("ok", "Service is ready")))
}
