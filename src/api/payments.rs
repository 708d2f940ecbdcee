//! Payment endpoints

use super::{respond, ApiState, AuthUser};
use crate::domain::PaymentRequest;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::info;

/// Pay the next installment of a contract
///
/// The amount must equal the earliest pending installment unless payment
/// ordering is relaxed in the configuration.
pub async fn make_payment(
    State(state): State<ApiState>,
    auth: AuthUser,
    Json(req): Json<PaymentRequest>,
) -> impl IntoResponse {
    info!(
        "API: Payment: contract_id={}, amount={}, user_id={}",
        req.contract_id, req.amount, auth.user.id
    );
    respond(
        state.app.market.make_payment(&auth.user, req).await,
        StatusCode::CREATED,
    )
}

/// Payments recorded against a contract
pub async fn contract_payments(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(contract_id): Path<String>,
) -> impl IntoResponse {
    respond(
        state.app.market.contract_payments(&auth.user, &contract_id).await,
        StatusCode::OK,
    )
}

/// The caller's earnings summary
pub async fn provider_earnings(State(state): State<ApiState>, auth: AuthUser) -> impl IntoResponse {
    respond(state.app.market.provider_earnings(&auth.user).await, StatusCode::OK)
}
