use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use tracing::{error, info};
use crate::auth::AuthError;
use crate::models::{error_response, ErrorResponse};
use crate::services::auth_service::get_auth_token;
use crate::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {

    // 1. Get the auth token from the request
    let token = get_auth_token(None, req.headers()).map_err(|e| {
        error_response(StatusCode::UNAUTHORIZED, e.to_string())
    })?;

    // 2. Validate the token
    let identity = match state.identity.authenticate(&token) {
        Ok(identity) => identity,
        Err(AuthError::NotConfigured) => {
            error!("JWT secret not configured");
            return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"));
        }
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(error_response(StatusCode::UNAUTHORIZED, "Invalid or expired token"));
        }
    };
    info!(user_id = identity.user_id, "User token validated successfully");

    // 3. Set the identity into request extensions for downstream handlers
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
