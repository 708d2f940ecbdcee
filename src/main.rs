use anyhow::Result;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use campus_market::{config::Config, MarketApp};

/// Environment variable holding the seeded admin's password
const ADMIN_PASSWORD_ENV: &str = "CAMPUS_MARKET_ADMIN_PASSWORD";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = load_config().await?;

    // Initialize tracing
    init_tracing(&config);

    info!("Starting campus-market...");

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    // Create the marketplace application
    let app = MarketApp::new(config).await?;

    seed_admin(&app).await?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    // Handle shutdown signals
    let app_clone = app.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, initiating graceful shutdown...");
                let _ = shutdown_tx.send(());
                if let Err(e) = app_clone.shutdown().await {
                    error!("Error during shutdown: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        }
    });

    // Run the application with shutdown handler
    app.run_with_shutdown(shutdown_rx).await?;

    info!("campus-market stopped gracefully");
    Ok(())
}

/// Install the tracing subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match config.logging.format.as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.with_thread_ids(true).init(),
    }
}

/// Create the configured admin account if it does not exist yet
async fn seed_admin(app: &MarketApp) -> Result<()> {
    let Some(email) = app.config.auth.admin_email.as_deref() else {
        return Ok(());
    };

    match std::env::var(ADMIN_PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => {
            let admin = app.market.seed_admin(email, "Administrator", &password).await?;
            info!("Admin account ready: {}", admin.email);
        }
        _ => warn!(
            "auth.admin_email is set but {} is empty; no admin account created",
            ADMIN_PASSWORD_ENV
        ),
    }
    Ok(())
}

/// Load configuration from file or use defaults
async fn load_config() -> Result<Config> {
    // Look for config in standard locations
    let config_paths = vec![
        PathBuf::from("./campus-market.toml"),
        PathBuf::from("/etc/campus-market/campus-market.toml"),
        dirs::config_dir()
            .map(|d| d.join("campus-market/campus-market.toml"))
            .unwrap_or_default(),
    ];

    for path in config_paths {
        if path.exists() {
            eprintln!("Loading configuration from: {}", path.display());
            let content = tokio::fs::read_to_string(&path).await?;
            let config: Config = toml::from_str(&content)?;
            return Ok(config);
        }
    }

    eprintln!("No configuration file found, using defaults");
    Ok(Config::default())
}
