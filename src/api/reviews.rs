//! Review endpoints

use super::{respond, ApiState, AuthUser};
use crate::domain::NewReview;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::info;

/// Review a completed booking
pub async fn create_review(
    State(state): State<ApiState>,
    auth: AuthUser,
    Json(req): Json<NewReview>,
) -> impl IntoResponse {
    info!(
        "API: Review: service_id={}, rating={}, user_id={}",
        req.service_id, req.rating, auth.user.id
    );
    respond(
        state.app.market.create_review(&auth.user, req).await,
        StatusCode::CREATED,
    )
}

/// Reviews of a listing
pub async fn service_reviews(
    State(state): State<ApiState>,
    Path(service_id): Path<String>,
) -> impl IntoResponse {
    respond(state.app.market.service_reviews(&service_id).await, StatusCode::OK)
}
