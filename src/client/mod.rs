//! Client core for the marketplace API
//!
//! This module provides what a front end needs to talk to the backend:
//! - [`MarketClient`]: one typed method per endpoint, bearer token attached
//! - [`Session`]: the single signed-in identity, observable by every screen
//! - [`QueryCache`]: read-through cache invalidated after mutations
//! - [`ContractWorkflow`]: gated contract mutations that re-read the contract
//! - [`Messenger`]: conversations read through the cache
//! - [`views`]: per-role projections of contracts

use crate::{
    api::{ApiResponse, HealthResponse},
    config::ClientConfig,
    domain::{
        AuthResponse, Contract, Conversation, LoginRequest, Message, MessagePage, NewContract,
        NewConversation, NewMessage, NewReview, NewService, Payment, PaymentRequest,
        ProviderEarnings, RegisterRequest, Review, Service, ServiceFilters, ServiceUpdate, User,
        VerificationDecision, VerificationSubmission,
    },
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod cache;
pub mod events;
pub mod messaging;
pub mod session;
pub mod views;
pub mod workflow;

pub use cache::{QueryCache, QueryKey};
pub use events::{CacheEvent, InvalidationBus};
pub use messaging::Messenger;
pub use session::{Identity, MemoryTokenStore, Session, TokenStore};
pub use workflow::{ContractWorkflow, MutationOutcome};

/// Errors surfaced to the user at the point of the failed interaction
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Refused before anything was sent
    #[error("{0}")]
    Validation(String),

    /// The backend refused the request
    #[error("Request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Message from the backend
        message: String,
    },

    /// Missing or invalid token; the session has been cleared
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Message from the backend
        message: String,
    },

    /// Unknown id
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend could not be reached
    #[error("Cannot reach backend: {0}")]
    Network(String),

    /// The backend answered with something unexpected
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Message to show the user, or `fallback` when there is nothing better
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Validation(message)
            | ClientError::Rejected { message, .. }
            | ClientError::Unauthorized { message }
            | ClientError::NotFound(message)
                if !message.trim().is_empty() =>
            {
                message.clone()
            }
            ClientError::Network(_) => {
                "Cannot reach the server. Check your connection and try again.".to_string()
            }
            _ => fallback.to_string(),
        }
    }

    /// HTTP status of a backend refusal
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            ClientError::Unauthorized { .. } => Some(401),
            ClientError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Typed HTTP client for the marketplace API
pub struct MarketClient {
    http: reqwest::Client,
    base_url: String,
    payment_method: String,
    session: Session,
}

impl MarketClient {
    /// Create a client for `config.base_url` sharing `session`
    pub fn new(config: &ClientConfig, session: Session) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to build HTTP client: {}", e)))?;

        info!("Market client targeting {}", config.base_url);

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            payment_method: config.payment_method.clone(),
            session,
        })
    }

    /// The shared session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Payment method sent with every payment
    pub fn payment_method(&self) -> &str {
        &self.payment_method
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, path: &str) -> ClientResult<T> {
        let request = self.request(method, path);
        self.execute(request, self.session.token()).await
    }

    async fn call_with<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let request = self.request(method, path).json(body);
        self.execute(request, self.session.token()).await
    }

    /// Send `request` and unwrap the response envelope
    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        token: Option<String>,
    ) -> ClientResult<T> {
        let request = match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        debug!("Response {} ({} bytes)", status, body.len());

        let envelope = serde_json::from_str::<ApiResponse<T>>(&body);

        if status.is_success() {
            return match envelope {
                Ok(ApiResponse {
                    data: Some(data), ..
                }) => Ok(data),
                Ok(_) => Err(ClientError::Decode("response carried no data".to_string())),
                Err(e) => Err(ClientError::Decode(e.to_string())),
            };
        }

        let message = envelope
            .ok()
            .and_then(|e| e.error)
            .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        match status {
            StatusCode::UNAUTHORIZED => {
                warn!("Backend refused the token; clearing session");
                self.session.clear();
                Err(ClientError::Unauthorized { message })
            }
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(message)),
            _ => Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            }),
        }
    }

    fn start_session(&self, auth: &AuthResponse) {
        self.session.set(Identity {
            token: auth.access_token.clone(),
            user: auth.user.clone(),
        });
    }

    /// Backend health
    pub async fn health(&self) -> ClientResult<HealthResponse> {
        self.call(Method::GET, "/health").await
    }

    /// Register and sign in
    pub async fn register(&self, req: &RegisterRequest) -> ClientResult<User> {
        let auth: AuthResponse = self.call_with(Method::POST, "/auth/register", req).await?;
        self.start_session(&auth);
        Ok(auth.user)
    }

    /// Sign in
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<User> {
        let req = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = self.call_with(Method::POST, "/auth/login", &req).await?;
        self.start_session(&auth);
        Ok(auth.user)
    }

    /// Restore the session from the persisted token
    ///
    /// Returns the signed-in user, or `None` when there was no usable token.
    /// Any failure clears the session.
    pub async fn hydrate(&self) -> ClientResult<Option<User>> {
        let Some(token) = self.session.persisted_token() else {
            return Ok(None);
        };

        let request = self.request(Method::GET, "/auth/me");
        match self.execute::<User>(request, Some(token.clone())).await {
            Ok(user) => {
                self.session.set(Identity {
                    token,
                    user: user.clone(),
                });
                Ok(Some(user))
            }
            Err(ClientError::Unauthorized { .. }) => {
                self.session.clear();
                Ok(None)
            }
            Err(e) => {
                self.session.clear();
                Err(e)
            }
        }
    }

    /// The signed-in user, fresh from the backend
    pub async fn me(&self) -> ClientResult<User> {
        let user: User = self.call(Method::GET, "/auth/me").await?;
        self.session.refresh_user(user.clone());
        Ok(user)
    }

    /// Revoke the token and clear the session
    ///
    /// The session is cleared even when the backend cannot be reached.
    pub async fn logout(&self) -> ClientResult<()> {
        let result = self
            .call::<serde_json::Value>(Method::POST, "/auth/logout")
            .await;
        self.session.clear();
        match result {
            Ok(_) | Err(ClientError::Unauthorized { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Submit a verification document reference
    pub async fn submit_verification(&self, document: &str) -> ClientResult<User> {
        let req = VerificationSubmission {
            document: document.to_string(),
        };
        let user: User = self
            .call_with(Method::POST, "/auth/verification", &req)
            .await?;
        self.session.refresh_user(user.clone());
        Ok(user)
    }

    /// Active listings matching `filters`
    pub async fn search_services(&self, filters: &ServiceFilters) -> ClientResult<Vec<Service>> {
        self.call_with(Method::POST, "/services/search", filters).await
    }

    /// A listing
    pub async fn get_service(&self, id: &str) -> ClientResult<Service> {
        self.call(Method::GET, &format!("/services/{}", id)).await
    }

    /// Publish a listing
    pub async fn create_service(&self, req: &NewService) -> ClientResult<Service> {
        self.call_with(Method::POST, "/services", req).await
    }

    /// Update a listing
    pub async fn update_service(&self, id: &str, update: &ServiceUpdate) -> ClientResult<Service> {
        self.call_with(Method::PUT, &format!("/services/{}", id), update)
            .await
    }

    /// Delete a listing
    pub async fn delete_service(&self, id: &str) -> ClientResult<()> {
        self.call::<serde_json::Value>(Method::DELETE, &format!("/services/{}", id))
            .await
            .map(|_| ())
    }

    /// The provider's own listings
    pub async fn my_listings(&self) -> ClientResult<Vec<Service>> {
        self.call(Method::GET, "/services/provider/my-listings").await
    }

    /// Request a contract
    pub async fn create_contract(&self, req: &NewContract) -> ClientResult<Contract> {
        self.call_with(Method::POST, "/contracts", req).await
    }

    /// Contracts where the signed-in user is the client
    pub async fn client_contracts(&self) -> ClientResult<Vec<Contract>> {
        self.call(Method::GET, "/contracts/client/my-contracts").await
    }

    /// Contracts where the signed-in user is the provider
    pub async fn provider_contracts(&self) -> ClientResult<Vec<Contract>> {
        self.call(Method::GET, "/contracts/provider/my-contracts").await
    }

    /// Contracts against a listing
    pub async fn service_contracts(&self, service_id: &str) -> ClientResult<Vec<Contract>> {
        self.call(Method::GET, &format!("/contracts/service/{}", service_id))
            .await
    }

    /// A contract
    pub async fn get_contract(&self, id: &str) -> ClientResult<Contract> {
        self.call(Method::GET, &format!("/contracts/{}", id)).await
    }

    /// Accept a pending request
    pub async fn provider_accept(&self, id: &str) -> ClientResult<Contract> {
        self.call(Method::POST, &format!("/contracts/{}/provider-accept", id))
            .await
    }

    /// Reject a pending request
    pub async fn provider_reject(&self, id: &str) -> ClientResult<Contract> {
        self.call(Method::POST, &format!("/contracts/{}/provider-reject", id))
            .await
    }

    /// Confirm an accepted contract
    pub async fn client_confirm(&self, id: &str) -> ClientResult<Contract> {
        self.call(Method::POST, &format!("/contracts/{}/client-confirm", id))
            .await
    }

    /// Sign as whichever party is due next
    pub async fn sign(&self, id: &str) -> ClientResult<Contract> {
        self.call(Method::POST, &format!("/contracts/{}/sign", id))
            .await
    }

    /// Cancel a contract
    pub async fn cancel(&self, id: &str) -> ClientResult<Contract> {
        self.call(Method::PUT, &format!("/contracts/{}/cancel", id))
            .await
    }

    /// Mark a contract complete
    pub async fn complete(&self, id: &str) -> ClientResult<Contract> {
        self.call(Method::PUT, &format!("/contracts/{}/complete", id))
            .await
    }

    /// Pay an installment
    pub async fn make_payment(&self, req: &PaymentRequest) -> ClientResult<Payment> {
        self.call_with(Method::POST, "/payments", req).await
    }

    /// Payments of a contract
    pub async fn contract_payments(&self, contract_id: &str) -> ClientResult<Vec<Payment>> {
        self.call(Method::GET, &format!("/payments/contract/{}", contract_id))
            .await
    }

    /// The provider's earnings summary
    pub async fn provider_earnings(&self) -> ClientResult<ProviderEarnings> {
        self.call(Method::GET, "/payments/provider/earnings").await
    }

    /// Review a completed booking
    pub async fn create_review(&self, req: &NewReview) -> ClientResult<Review> {
        self.call_with(Method::POST, "/reviews", req).await
    }

    /// Reviews of a listing
    pub async fn service_reviews(&self, service_id: &str) -> ClientResult<Vec<Review>> {
        self.call(Method::GET, &format!("/reviews/service/{}", service_id))
            .await
    }

    /// Open a conversation, or get the existing one with the same user
    pub async fn start_conversation(&self, req: &NewConversation) -> ClientResult<Conversation> {
        self.call_with(Method::POST, "/conversations", req).await
    }

    /// The signed-in user's conversations
    pub async fn conversations(&self) -> ClientResult<Vec<Conversation>> {
        self.call(Method::GET, "/conversations").await
    }

    /// A page of messages; the backend marks the other side's as read
    pub async fn messages(&self, conversation_id: &str, page: MessagePage) -> ClientResult<Vec<Message>> {
        let request = self
            .request(Method::GET, &format!("/conversations/{}/messages", conversation_id))
            .query(&page);
        self.execute(request, self.session.token()).await
    }

    /// Post a message
    pub async fn send_message(&self, conversation_id: &str, content: &str) -> ClientResult<Message> {
        let req = NewMessage {
            content: content.to_string(),
        };
        req.validate().map_err(ClientError::Validation)?;
        self.call_with(
            Method::POST,
            &format!("/conversations/{}/messages", conversation_id),
            &req,
        )
        .await
    }

    /// Every user (admin)
    pub async fn list_users(&self) -> ClientResult<Vec<User>> {
        self.call(Method::GET, "/admin/users").await
    }

    /// Users awaiting verification (admin)
    pub async fn pending_verifications(&self) -> ClientResult<Vec<User>> {
        self.call(Method::GET, "/admin/pending-verifications").await
    }

    /// Approve or reject a verification (admin)
    pub async fn verify_user(&self, decision: &VerificationDecision) -> ClientResult<User> {
        self.call_with(Method::POST, "/admin/verify-user", decision)
            .await
    }

    /// Every listing (admin)
    pub async fn all_services(&self) -> ClientResult<Vec<Service>> {
        self.call(Method::GET, "/admin/services").await
    }

    /// Every contract (admin)
    pub async fn all_contracts(&self) -> ClientResult<Vec<Contract>> {
        self.call(Method::GET, "/admin/contracts").await
    }

    /// Suspend or reinstate a listing (admin)
    pub async fn set_service_suspended(&self, id: &str, suspended: bool) -> ClientResult<Service> {
        let action = if suspended { "suspend" } else { "unsuspend" };
        self.call(Method::PUT, &format!("/admin/services/{}/{}", id, action))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefers_server_text() {
        let err = ClientError::Rejected {
            status: 409,
            message: "Contract was modified concurrently and is now rejected".to_string(),
        };
        assert_eq!(
            err.user_message("Something went wrong"),
            "Contract was modified concurrently and is now rejected"
        );
        assert_eq!(err.status(), Some(409));

        let err = ClientError::Decode("eof".to_string());
        assert_eq!(err.user_message("Something went wrong"), "Something went wrong");

        let err = ClientError::Rejected {
            status: 500,
            message: "  ".to_string(),
        };
        assert_eq!(err.user_message("Try again"), "Try again");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let config = ClientConfig {
            base_url: "http://127.0.0.1:9/api".to_string(),
            timeout_seconds: 2,
            payment_method: "mock_card".to_string(),
        };
        let client = MarketClient::new(&config, Session::in_memory()).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
        assert!(err.user_message("x").contains("Cannot reach"));
    }
}
