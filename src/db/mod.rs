//! Database module for campus-market
//!
//! This module handles persistent storage for:
//! - Users and their session tokens
//! - Service listings
//! - Contracts with their payment schedules
//! - Payments and reviews
//! - Conversations and their messages

use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

mod contracts;
mod messages;
mod models;
mod queries;

pub use contracts::*;
pub use messages::*;
pub use models::*;
pub use queries::*;

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    /// SQLite connection (wrapped in Arc<Mutex> for thread safety)
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Connect to the database
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to database at {}", database_url);

        let path = database_url
            .strip_prefix("sqlite:")
            .unwrap_or(database_url);

        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Self::run_migrations(&conn)?;

        info!("Database connected successfully");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
        debug!("Running database migrations...");

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                full_name TEXT NOT NULL,
                client_type TEXT,
                university TEXT,
                student_number TEXT,
                verification_status TEXT NOT NULL DEFAULT 'unverified',
                verification_document TEXT,
                verification_rejected_reason TEXT,
                safety_score REAL NOT NULL DEFAULT 100,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL,
                last_login DATETIME
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                created_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS services (
                id TEXT PRIMARY KEY,
                provider_id TEXT NOT NULL REFERENCES users(id),
                service_type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                price_monthly TEXT NOT NULL,
                capacity INTEGER NOT NULL,
                available_slots INTEGER NOT NULL,
                location TEXT NOT NULL,
                transportation TEXT,
                residence TEXT,
                rating_average TEXT NOT NULL DEFAULT '0',
                rating_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                auto_accept BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS contracts (
                id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL REFERENCES services(id),
                client_id TEXT NOT NULL REFERENCES users(id),
                provider_id TEXT NOT NULL REFERENCES users(id),
                status TEXT NOT NULL,
                start_date DATE NOT NULL,
                end_date DATE NOT NULL,
                duration_months INTEGER NOT NULL,
                monthly_amount TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                currency TEXT NOT NULL,
                client_signed BOOLEAN NOT NULL DEFAULT 0,
                client_signed_at DATETIME,
                provider_signed BOOLEAN NOT NULL DEFAULT 0,
                provider_signed_at DATETIME,
                terms TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS payment_schedule (
                contract_id TEXT NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                due_date DATE NOT NULL,
                amount TEXT NOT NULL,
                status TEXT NOT NULL,
                paid_at DATETIME,
                transaction_id TEXT,
                PRIMARY KEY (contract_id, seq)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                contract_id TEXT NOT NULL REFERENCES contracts(id),
                client_id TEXT NOT NULL,
                provider_id TEXT NOT NULL,
                amount TEXT NOT NULL,
                currency TEXT NOT NULL,
                status TEXT NOT NULL,
                payment_method TEXT NOT NULL,
                transaction_id TEXT NOT NULL UNIQUE,
                provider_amount TEXT NOT NULL,
                platform_fee TEXT NOT NULL,
                installment INTEGER NOT NULL,
                payment_date DATETIME NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL REFERENCES services(id),
                client_id TEXT NOT NULL REFERENCES users(id),
                contract_id TEXT NOT NULL REFERENCES contracts(id),
                rating INTEGER NOT NULL,
                safety_rating INTEGER NOT NULL,
                review_text TEXT NOT NULL,
                categories TEXT,
                verified_booking BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL,
                UNIQUE (service_id, client_id)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                participant_a TEXT NOT NULL REFERENCES users(id),
                participant_b TEXT NOT NULL REFERENCES users(id),
                contract_id TEXT REFERENCES contracts(id),
                last_message TEXT,
                last_message_time DATETIME,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                UNIQUE (participant_a, participant_b)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                sender_id TEXT NOT NULL REFERENCES users(id),
                sender_name TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                is_read BOOLEAN NOT NULL DEFAULT 0
            )
            "#,
            [],
        )?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_services_provider ON services(provider_id)",
            "CREATE INDEX IF NOT EXISTS idx_contracts_client ON contracts(client_id)",
            "CREATE INDEX IF NOT EXISTS idx_contracts_provider ON contracts(provider_id)",
            "CREATE INDEX IF NOT EXISTS idx_contracts_service ON contracts(service_id)",
            "CREATE INDEX IF NOT EXISTS idx_payments_contract ON payments(contract_id)",
            "CREATE INDEX IF NOT EXISTS idx_payments_provider ON payments(provider_id)",
            "CREATE INDEX IF NOT EXISTS idx_reviews_service ON reviews(service_id)",
            "CREATE INDEX IF NOT EXISTS idx_conversations_b ON conversations(participant_b)",
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at)",
        ] {
            conn.execute(index, [])?;
        }

        debug!("Database migrations completed");
        Ok(())
    }

    /// Get the database connection
    pub fn conn(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// Check the connection answers a trivial query
    pub async fn ping(&self) -> bool {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    /// Close the database connection
    pub async fn close(&self) {
        info!("Closing database connection...");
        // Dropping the last Arc closes the connection
        info!("Database connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_connect() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let conn_lock = db.conn();
        let conn = conn_lock.lock().await;
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN \
                 ('users','sessions','services','contracts','payment_schedule','payments','reviews',\
                 'conversations','messages')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 9);
    }

    #[tokio::test]
    async fn test_file_database_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("nested/market.db").display());

        {
            let db = Database::connect(&url).await.unwrap();
            let conn = db.conn();
            let conn = conn.lock().await;
            conn.execute(
                "INSERT INTO users (id, email, password_hash, role, full_name, created_at) \
                 VALUES ('u1', 'a@b.c', 'x', 'client', 'A', '2025-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        }

        let db = Database::connect(&url).await.unwrap();
        let conn = db.conn();
        let conn = conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
