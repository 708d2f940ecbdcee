//! HTTP API for the marketplace
//!
//! This module provides a RESTful API under `/api` for:
//! - Registration, login and identity verification
//! - Publishing and searching service listings
//! - The contract approval handshake and its transitions
//! - Installment payments, earnings and reviews
//! - Direct messages between users
//! - Admin moderation

use crate::{domain::User, MarketApp, MarketError, MarketResult};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

mod admin;
mod auth;
mod contracts;
mod conversations;
mod health;
mod payments;
mod reviews;
mod services;

pub use admin::*;
pub use auth::*;
pub use contracts::*;
pub use conversations::*;
pub use health::*;
pub use payments::*;
pub use reviews::*;
pub use services::*;

/// API state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// The marketplace application
    pub app: MarketApp,
}

/// Build the API router
pub fn build_router(app: MarketApp) -> Router {
    let state = ApiState { app };

    let api = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Accounts
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route("/auth/verification", post(submit_verification))
        // Listings
        .route("/services", get(list_services).post(create_service))
        .route("/services/search", post(search_services))
        .route("/services/provider/my-listings", get(my_listings))
        .route(
            "/services/:id",
            get(get_service).put(update_service).delete(delete_service),
        )
        // Contracts
        .route("/contracts", post(create_contract))
        .route("/contracts/client/my-contracts", get(client_contracts))
        .route("/contracts/provider/my-contracts", get(provider_contracts))
        .route("/contracts/service/:id", get(service_contracts))
        .route("/contracts/:id", get(get_contract))
        .route("/contracts/:id/provider-accept", post(provider_accept))
        .route("/contracts/:id/provider-reject", post(provider_reject))
        .route("/contracts/:id/client-confirm", post(client_confirm))
        .route("/contracts/:id/sign", post(sign_contract))
        .route("/contracts/:id/cancel", put(cancel_contract))
        .route("/contracts/:id/complete", put(complete_contract))
        // Payments
        .route("/payments", post(make_payment))
        .route("/payments/contract/:id", get(contract_payments))
        .route("/payments/provider/earnings", get(provider_earnings))
        // Reviews
        .route("/reviews", post(create_review))
        .route("/reviews/service/:id", get(service_reviews))
        // Messaging
        .route(
            "/conversations",
            get(list_conversations).post(start_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(conversation_messages).post(send_message),
        )
        // Admin
        .route("/admin/users", get(list_users))
        .route("/admin/pending-verifications", get(pending_verifications))
        .route("/admin/verify-user", post(verify_user))
        .route("/admin/services", get(all_services))
        .route("/admin/services/:id/suspend", put(suspend_service))
        .route("/admin/services/:id/unsuspend", put(unsuspend_service))
        .route("/admin/contracts", get(all_contracts))
        // Add state
        .with_state(state);

    Router::new().nest("/api", api)
}

/// Start the HTTP API server
pub async fn serve(app: MarketApp) -> anyhow::Result<()> {
    let (_shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    serve_with_shutdown(app, shutdown_rx).await
}

/// Start the HTTP API server with graceful shutdown
pub async fn serve_with_shutdown(
    app: MarketApp,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    // Parse bind address
    let addr: std::net::SocketAddr = app
        .config
        .api_bind_address()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

    info!("Starting HTTP API server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    serve_listener(app, listener, async move {
        let _ = shutdown_rx.await;
    })
    .await
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_listener<F>(
    app: MarketApp,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let enable_cors = app.config.api.enable_cors;
    let router = build_router(app);

    // Add CORS if enabled
    let router = if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Received shutdown signal, stopping API server...");
        })
        .await?;

    info!("API server stopped gracefully");
    Ok(())
}

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (only present if success is true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (only present if success is false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Convert MarketError to HTTP status code
pub fn error_to_status_code(err: &MarketError) -> StatusCode {
    use crate::domain::TransitionError;
    match err {
        MarketError::Validation(_) => StatusCode::BAD_REQUEST,
        MarketError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
        MarketError::NotFound(_) => StatusCode::NOT_FOUND,
        MarketError::Conflict(_) => StatusCode::CONFLICT,
        MarketError::InvalidTransition(TransitionError::WrongRole { .. }) => StatusCode::FORBIDDEN,
        MarketError::InvalidTransition(_) => StatusCode::CONFLICT,
        MarketError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        MarketError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Wrap a service result, answering `ok` on success
pub(crate) fn respond<T>(result: MarketResult<T>, ok: StatusCode) -> (StatusCode, Json<ApiResponse<T>>) {
    match result {
        Ok(data) => (ok, Json(ApiResponse::success(data))),
        Err(e) => {
            let status = error_to_status_code(&e);
            if status.is_server_error() {
                error!("API: request failed: {}", e);
            } else {
                debug!("API: request refused ({}): {}", status, e);
            }
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// The caller identified by the request's bearer token
pub struct AuthUser {
    /// Authenticated user
    pub user: User,
    /// Token the request carried
    pub token: String,
}

#[axum::async_trait]
impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = (StatusCode, Json<ApiResponse<()>>);

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ApiResponse::error("Missing bearer token")),
                )
            })?;

        match state.app.market.authenticate(token).await {
            Ok(user) => Ok(AuthUser {
                user,
                token: token.to_string(),
            }),
            Err(e) => Err((error_to_status_code(&e), Json(ApiResponse::error(e.to_string())))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContractStatus, Role, Transition, TransitionError};

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            error_to_status_code(&MarketError::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_to_status_code(&MarketError::Conflict("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_to_status_code(&MarketError::InvalidTransition(TransitionError::NotAllowed {
                from: ContractStatus::Rejected,
                transition: Transition::Cancel,
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_to_status_code(&MarketError::InvalidTransition(TransitionError::WrongRole {
                role: Role::Client,
                transition: Transition::ProviderAccept,
            })),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_error_body_shape() {
        let (status, Json(body)) =
            respond::<()>(Err(MarketError::NotFound("Contract c1".into())), StatusCode::OK);
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
        assert!(json["error"].as_str().unwrap().contains("Contract c1"));
    }
}
