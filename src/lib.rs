//! campus-market: contract lifecycle service for a verified student services marketplace
//!
//! Clients (students and employees) contract transportation and residence
//! services from verified providers. This crate contains both halves of that
//! exchange:
//!
//! - **Domain model**: contracts, their status state machine, monthly payment
//!   schedules, the platform revenue split and per-role action gating
//! - **Backend service**: an HTTP API over SQLite that validates and applies
//!   every contract transition and payment
//! - **Client core**: a typed HTTP client with a shared session, a read-through
//!   query cache and a mutation workflow that re-reads contracts after every
//!   change
//!
//! # Architecture
//!
//! 1. [`domain`] holds the pure data model shared by both halves
//! 2. [`market`] applies business rules on top of the [`db`] store
//! 3. [`api`] exposes the market service over HTTP
//! 4. [`client`] talks to the API and keeps views consistent with it
//!
#![warn(missing_docs)]

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod domain;
pub mod fee;
pub mod market;

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub use config::Config;
use db::Database;
use domain::TransitionError;
use market::MarketService;

/// The main marketplace application state
#[derive(Clone)]
pub struct MarketApp {
    /// Application configuration
    pub config: Arc<Config>,
    /// Database connection
    pub db: Arc<Database>,
    /// Business rules over the store
    pub market: Arc<MarketService>,
}

impl MarketApp {
    /// Create a new marketplace application instance
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing campus-market application...");

        config.validate().map_err(MarketError::Config)?;
        let config = Arc::new(config);

        let db_url = config.resolve_database_url();
        info!("Connecting to database at: {}", db_url);
        let db = Arc::new(Database::connect(&db_url).await?);

        let market = Arc::new(MarketService::new(config.clone(), db.clone()));

        info!("campus-market application initialized successfully");

        Ok(Self { config, db, market })
    }

    /// Start the application
    pub async fn run(&self) -> Result<()> {
        let (_shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        self.run_with_shutdown(shutdown_rx).await
    }

    /// Start the application with shutdown signal
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) -> Result<()> {
        info!("Starting campus-market application...");

        let api_handle = tokio::spawn({
            let app = self.clone();
            async move {
                if let Err(e) = api::serve_with_shutdown(app, shutdown_rx).await {
                    warn!("API server error: {}", e);
                }
            }
        });

        info!(
            "campus-market running. API available at http://{}/api",
            self.config.api_bind_address()
        );

        api_handle.await?;

        Ok(())
    }

    /// Shutdown the application gracefully
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down campus-market application...");
        self.db.close().await;
        info!("campus-market shutdown complete");
        Ok(())
    }
}

/// Error types for the marketplace backend
#[derive(thiserror::Error, Debug)]
pub enum MarketError {
    /// Malformed or inconsistent input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing, expired or wrong credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown id
    #[error("Not found: {0}")]
    NotFound(String),

    /// The resource changed underneath the request
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transition not allowed from the contract's current status
    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    /// Storage failure
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for marketplace operations
pub type MarketResult<T> = std::result::Result<T, MarketError>;
