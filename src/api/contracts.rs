//! Contract lifecycle endpoints

use super::{respond, ApiState, AuthUser};
use crate::domain::NewContract;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::info;

/// Request a contract against a listing
pub async fn create_contract(
    State(state): State<ApiState>,
    auth: AuthUser,
    Json(req): Json<NewContract>,
) -> impl IntoResponse {
    info!(
        "API: Create contract: client_id={}, service_id={}, months={}",
        auth.user.id, req.service_id, req.duration_months
    );
    respond(
        state.app.market.create_contract(&auth.user, req).await,
        StatusCode::CREATED,
    )
}

/// Contracts where the caller is the client
pub async fn client_contracts(State(state): State<ApiState>, auth: AuthUser) -> impl IntoResponse {
    respond(state.app.market.client_contracts(&auth.user).await, StatusCode::OK)
}

/// Contracts where the caller is the provider
pub async fn provider_contracts(
    State(state): State<ApiState>,
    auth: AuthUser,
) -> impl IntoResponse {
    respond(state.app.market.provider_contracts(&auth.user).await, StatusCode::OK)
}

/// Contracts against one listing
pub async fn service_contracts(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(service_id): Path<String>,
) -> impl IntoResponse {
    respond(
        state.app.market.service_contracts(&auth.user, &service_id).await,
        StatusCode::OK,
    )
}

/// Get a contract
pub async fn get_contract(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(state.app.market.get_contract(&auth.user, &id).await, StatusCode::OK)
}

/// Provider accepts a pending request
pub async fn provider_accept(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!("API: Provider accept: contract_id={}, user_id={}", id, auth.user.id);
    respond(state.app.market.provider_accept(&auth.user, &id).await, StatusCode::OK)
}

/// Provider rejects a pending request
pub async fn provider_reject(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!("API: Provider reject: contract_id={}, user_id={}", id, auth.user.id);
    respond(state.app.market.provider_reject(&auth.user, &id).await, StatusCode::OK)
}

/// Client confirms an accepted contract
pub async fn client_confirm(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!("API: Client confirm: contract_id={}, user_id={}", id, auth.user.id);
    respond(state.app.market.client_confirm(&auth.user, &id).await, StatusCode::OK)
}

/// Sign as whichever party is due next
pub async fn sign_contract(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!("API: Sign contract: contract_id={}, user_id={}", id, auth.user.id);
    respond(state.app.market.sign(&auth.user, &id).await, StatusCode::OK)
}

/// Cancel a contract
pub async fn cancel_contract(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!("API: Cancel contract: contract_id={}, user_id={}", id, auth.user.id);
    respond(state.app.market.cancel(&auth.user, &id).await, StatusCode::OK)
}

/// Mark a contract complete
pub async fn complete_contract(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!("API: Complete contract: contract_id={}, user_id={}", id, auth.user.id);
    respond(state.app.market.complete(&auth.user, &id).await, StatusCode::OK)
}
