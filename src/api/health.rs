//! Health check endpoints

use super::{ApiResponse, ApiState};
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Whether the database answers queries
    pub database_connected: bool,
    /// Platform fee charged on payments, in percent
    pub platform_fee_percent: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<ApiState>) -> Json<ApiResponse<HealthResponse>> {
    let database_connected = state.app.db.ping().await;

    let response = HealthResponse {
        status: if database_connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database_connected,
        platform_fee_percent: state.app.config.marketplace.platform_fee_percent.to_string(),
    };

    Json(ApiResponse::success(response))
}
