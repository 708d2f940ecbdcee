//! Account endpoints

use super::{respond, ApiState, AuthUser};
use crate::domain::{LoginRequest, RegisterRequest, VerificationSubmission};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::info;

/// Register a client or provider
pub async fn register(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    info!("API: Register: email={}, role={}", req.email, req.role);
    respond(state.app.market.register(req).await, StatusCode::CREATED)
}

/// Exchange credentials for a token
pub async fn login(
    State(state): State<ApiState>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    info!("API: Login: email={}", req.email);
    respond(state.app.market.login(req).await, StatusCode::OK)
}

/// The authenticated user
pub async fn me(auth: AuthUser) -> impl IntoResponse {
    respond(Ok(auth.user), StatusCode::OK)
}

/// Revoke the request's token
pub async fn logout(State(state): State<ApiState>, auth: AuthUser) -> impl IntoResponse {
    info!("API: Logout: user_id={}", auth.user.id);
    let result = state
        .app
        .market
        .logout(&auth.token)
        .await
        .map(|()| serde_json::json!({ "logged_out": true }));
    respond(result, StatusCode::OK)
}

/// Submit a verification document reference
pub async fn submit_verification(
    State(state): State<ApiState>,
    auth: AuthUser,
    Json(req): Json<VerificationSubmission>,
) -> impl IntoResponse {
    info!("API: Verification submitted: user_id={}", auth.user.id);
    respond(
        state.app.market.submit_verification(&auth.user, &req.document).await,
        StatusCode::OK,
    )
}
