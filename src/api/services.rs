//! Service listing endpoints

use super::{respond, ApiState, AuthUser};
use crate::domain::{NewService, ServiceFilters, ServiceUpdate};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::info;

/// Active listings, filtered by query parameters
pub async fn list_services(
    State(state): State<ApiState>,
    Query(filters): Query<ServiceFilters>,
) -> impl IntoResponse {
    respond(state.app.market.search_services(&filters).await, StatusCode::OK)
}

/// Active listings, filtered by a JSON body
pub async fn search_services(
    State(state): State<ApiState>,
    Json(filters): Json<ServiceFilters>,
) -> impl IntoResponse {
    info!("API: Search services: {:?}", filters);
    respond(state.app.market.search_services(&filters).await, StatusCode::OK)
}

/// Publish a listing
pub async fn create_service(
    State(state): State<ApiState>,
    auth: AuthUser,
    Json(req): Json<NewService>,
) -> impl IntoResponse {
    info!(
        "API: Create service: provider_id={}, type={}, title={}",
        auth.user.id, req.service_type, req.title
    );
    respond(
        state.app.market.create_service(&auth.user, req).await,
        StatusCode::CREATED,
    )
}

/// Get a listing
pub async fn get_service(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(state.app.market.get_service(&id).await, StatusCode::OK)
}

/// Update a listing
pub async fn update_service(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(update): Json<ServiceUpdate>,
) -> impl IntoResponse {
    info!("API: Update service: id={}, user_id={}", id, auth.user.id);
    respond(
        state.app.market.update_service(&auth.user, &id, update).await,
        StatusCode::OK,
    )
}

/// Delete a listing
pub async fn delete_service(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!("API: Delete service: id={}, user_id={}", id, auth.user.id);
    let result = state
        .app
        .market
        .delete_service(&auth.user, &id)
        .await
        .map(|()| serde_json::json!({ "id": id, "deleted": true }));
    respond(result, StatusCode::OK)
}

/// The caller's own listings
pub async fn my_listings(State(state): State<ApiState>, auth: AuthUser) -> impl IntoResponse {
    respond(state.app.market.provider_services(&auth.user).await, StatusCode::OK)
}
