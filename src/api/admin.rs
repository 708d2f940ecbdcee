//! Admin endpoints

use super::{respond, ApiState, AuthUser};
use crate::domain::VerificationDecision;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::info;

/// Every user
pub async fn list_users(State(state): State<ApiState>, auth: AuthUser) -> impl IntoResponse {
    respond(state.app.market.list_users(&auth.user).await, StatusCode::OK)
}

/// Users awaiting a verification decision
pub async fn pending_verifications(
    State(state): State<ApiState>,
    auth: AuthUser,
) -> impl IntoResponse {
    respond(
        state.app.market.pending_verifications(&auth.user).await,
        StatusCode::OK,
    )
}

/// Approve or reject a user's verification
pub async fn verify_user(
    State(state): State<ApiState>,
    auth: AuthUser,
    Json(decision): Json<VerificationDecision>,
) -> impl IntoResponse {
    info!(
        "API: Verification decision: user_id={}, decision={}, by={}",
        decision.user_id,
        decision.decision.as_str(),
        auth.user.id
    );
    respond(
        state.app.market.verify_user(&auth.user, decision).await,
        StatusCode::OK,
    )
}

/// Every listing
pub async fn all_services(State(state): State<ApiState>, auth: AuthUser) -> impl IntoResponse {
    respond(state.app.market.all_services(&auth.user).await, StatusCode::OK)
}

/// Every contract
pub async fn all_contracts(State(state): State<ApiState>, auth: AuthUser) -> impl IntoResponse {
    respond(state.app.market.all_contracts(&auth.user).await, StatusCode::OK)
}

/// Suspend a listing
pub async fn suspend_service(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!("API: Suspend service: id={}, by={}", id, auth.user.id);
    respond(
        state.app.market.set_service_suspended(&auth.user, &id, true).await,
        StatusCode::OK,
    )
}

/// Reinstate a suspended listing
pub async fn unsuspend_service(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!("API: Unsuspend service: id={}, by={}", id, auth.user.id);
    respond(
        state.app.market.set_service_suspended(&auth.user, &id, false).await,
        StatusCode::OK,
    )
}
