//! Database queries for accounts, listings and reviews

use super::models::{
    json_column, parse_column, to_json, user_from_row, SessionModel, UserRecord, USER_COLUMNS,
};
use super::Database;
use crate::domain::{
    Review, Service, ServiceRating, ServiceStatus, ServiceUpdate, VerificationStatus,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};

/// User queries
pub struct UserQueries<'a> {
    db: &'a Database,
}

impl<'a> UserQueries<'a> {
    /// Create a new query instance
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new user
    pub async fn insert(&self, record: &UserRecord) -> Result<()> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let user = &record.user;
        conn.execute(
            r#"
            INSERT INTO users (id, email, password_hash, role, full_name, client_type, university,
                               student_number, verification_status, verification_document,
                               verification_rejected_reason, safety_score, is_active, created_at, last_login)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            rusqlite::params![
                &user.id,
                &user.email,
                &record.password_hash,
                user.role.as_str(),
                &user.profile.full_name,
                user.profile.client_type.map(|t| t.as_str()),
                user.profile.university.as_deref(),
                user.profile.student_number.as_deref(),
                user.profile.verification_status.as_str(),
                user.profile.verification_document.as_deref(),
                user.profile.verification_rejected_reason.as_deref(),
                user.safety_score,
                user.is_active,
                user.profile.created_at,
                user.profile.last_login,
            ],
        )?;
        info!(
            "DB: Inserted user: id={}, role={}, verification={}",
            user.id,
            user.role,
            user.profile.verification_status.as_str()
        );
        Ok(())
    }

    /// Get a user by ID
    pub async fn get_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [id],
                user_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Get a user by email (case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE lower(email) = lower(?1)",
                    USER_COLUMNS
                ),
                [email],
                user_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// List all users, newest first
    pub async fn list_all(&self) -> Result<Vec<UserRecord>> {
        self.list_where("1 = 1", &[]).await
    }

    /// List users waiting for a verification decision
    pub async fn list_pending_verification(&self) -> Result<Vec<UserRecord>> {
        self.list_where(
            "verification_status = ?1",
            &[VerificationStatus::Pending.as_str()],
        )
        .await
    }

    async fn list_where(&self, clause: &str, args: &[&str]) -> Result<Vec<UserRecord>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users WHERE {} ORDER BY created_at DESC",
            USER_COLUMNS, clause
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), user_from_row)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Record a submitted verification document and mark the user pending
    pub async fn submit_verification(&self, id: &str, document: &str) -> Result<bool> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let updated = conn.execute(
            r#"
            UPDATE users
            SET verification_document = ?1, verification_status = ?2, verification_rejected_reason = NULL
            WHERE id = ?3
            "#,
            rusqlite::params![document, VerificationStatus::Pending.as_str(), id],
        )?;
        info!("DB: Verification submitted: user_id={}", id);
        Ok(updated > 0)
    }

    /// Store an admin verification decision
    pub async fn set_verification(
        &self,
        id: &str,
        status: VerificationStatus,
        reason: Option<&str>,
    ) -> Result<bool> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let updated = conn.execute(
            "UPDATE users SET verification_status = ?1, verification_rejected_reason = ?2 WHERE id = ?3",
            rusqlite::params![status.as_str(), reason, id],
        )?;
        info!(
            "DB: Updated verification: user_id={}, status={}, reason={:?}",
            id,
            status.as_str(),
            reason
        );
        Ok(updated > 0)
    }

    /// Record a successful login
    pub async fn touch_login(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            rusqlite::params![at, id],
        )?;
        Ok(())
    }
}

/// Session token queries
pub struct SessionQueries<'a> {
    db: &'a Database,
}

impl<'a> SessionQueries<'a> {
    /// Create a new query instance
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Store a new session
    pub async fn insert(&self, session: &SessionModel) -> Result<()> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                &session.token,
                &session.user_id,
                session.created_at,
                session.expires_at
            ],
        )?;
        info!("DB: Created session for user_id={}", session.user_id);
        Ok(())
    }

    /// Owner of `token` if it has not expired at `now`
    pub async fn user_for_token(&self, token: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let user_id = conn
            .query_row(
                "SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > ?2",
                rusqlite::params![token, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(user_id)
    }

    /// Revoke a session
    pub async fn delete(&self, token: &str) -> Result<bool> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let deleted = conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
        Ok(deleted > 0)
    }

    /// Drop every session expired at `now`
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            rusqlite::params![now],
        )?;
        if deleted > 0 {
            info!("DB: Purged {} expired sessions", deleted);
        }
        Ok(deleted)
    }
}

const SERVICE_COLUMNS: &str = "s.id, s.provider_id, COALESCE(u.full_name, ''), s.service_type, \
    s.title, s.description, s.category, s.price_monthly, s.capacity, s.available_slots, \
    s.location, s.transportation, s.residence, s.rating_average, s.rating_count, s.status, \
    s.auto_accept, s.created_at, s.updated_at";

fn service_from_row(row: &Row<'_>) -> rusqlite::Result<Service> {
    let location = json_column(row, 10)?.ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Null,
            "service location is missing".into(),
        )
    })?;

    Ok(Service {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        provider_name: row.get(2)?,
        service_type: parse_column(row, 3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        category: row.get(6)?,
        price_monthly: parse_column(row, 7)?,
        capacity: row.get(8)?,
        available_slots: row.get(9)?,
        location,
        transportation: json_column(row, 11)?,
        residence: json_column(row, 12)?,
        rating: ServiceRating {
            average: parse_column(row, 13)?,
            count: row.get(14)?,
        },
        status: parse_column(row, 15)?,
        auto_accept: row.get::<_, i32>(16)? != 0,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

/// Service listing queries
pub struct ServiceQueries<'a> {
    db: &'a Database,
}

impl<'a> ServiceQueries<'a> {
    /// Create a new query instance
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new listing
    pub async fn insert(&self, service: &Service) -> Result<()> {
        let location = to_json(&service.location)?;
        let transportation = service.transportation.as_ref().map(to_json).transpose()?;
        let residence = service.residence.as_ref().map(to_json).transpose()?;

        let conn = self.db.conn();
        let conn = conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO services (id, provider_id, service_type, title, description, category,
                                  price_monthly, capacity, available_slots, location, transportation,
                                  residence, rating_average, rating_count, status, auto_accept,
                                  created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            rusqlite::params![
                &service.id,
                &service.provider_id,
                service.service_type.as_str(),
                &service.title,
                &service.description,
                &service.category,
                service.price_monthly.to_string(),
                service.capacity,
                service.available_slots,
                location,
                transportation,
                residence,
                service.rating.average.to_string(),
                service.rating.count,
                service.status.as_str(),
                service.auto_accept,
                service.created_at,
                service.updated_at,
            ],
        )?;
        info!(
            "DB: Inserted service: id={}, provider_id={}, type={}, slots={}",
            service.id, service.provider_id, service.service_type, service.available_slots
        );
        Ok(())
    }

    /// Apply an owner's edit to the listing as it stands now
    ///
    /// The edit is validated against the current row inside the same
    /// transaction that writes it. Capacity changes shift `available_slots`
    /// by the same delta so slots reserved by active contracts stay reserved.
    /// Status is only written when the edit names one.
    pub async fn edit(&self, id: &str, update: &ServiceUpdate, at: DateTime<Utc>) -> Result<EditOutcome> {
        let conn = self.db.conn();
        let mut conn = conn.lock().await;
        let tx = conn.transaction()?;

        let Some(current) = load_service(&tx, id)? else {
            return Ok(EditOutcome::Missing);
        };
        let mut edited = current.clone();
        if let Err(reason) = update.clone().apply_to(&mut edited) {
            debug!("DB: Service edit refused: id={}, reason={}", id, reason);
            return Ok(EditOutcome::Rejected(reason));
        }

        let location = to_json(&edited.location)?;
        let transportation = edited.transportation.as_ref().map(to_json).transpose()?;
        let residence = edited.residence.as_ref().map(to_json).transpose()?;
        let capacity_delta = i64::from(edited.capacity) - i64::from(current.capacity);
        let slot_delta = i64::from(edited.available_slots) - i64::from(current.available_slots);
        let status = update.status.map(|s| s.as_str());

        let updated = tx.execute(
            r#"
            UPDATE services
            SET title = ?1, description = ?2, category = ?3, price_monthly = ?4, location = ?5,
                transportation = ?6, residence = ?7, auto_accept = ?8, updated_at = ?9,
                capacity = capacity + ?10,
                available_slots = available_slots + ?11,
                status = COALESCE(?12, status)
            WHERE id = ?13
              AND available_slots + ?11 >= 0
              AND available_slots + ?11 <= capacity + ?10
              AND (?12 IS NULL OR status != 'suspended')
            "#,
            rusqlite::params![
                &edited.title,
                &edited.description,
                &edited.category,
                edited.price_monthly.to_string(),
                location,
                transportation,
                residence,
                edited.auto_accept,
                at,
                capacity_delta,
                slot_delta,
                status,
                id,
            ],
        )?;
        if updated == 0 {
            return Ok(EditOutcome::Rejected(
                "Listing changed while it was being edited".to_string(),
            ));
        }

        let service = load_service(&tx, id)?.ok_or_else(|| anyhow::anyhow!("service {} vanished", id))?;
        tx.commit()?;
        info!(
            "DB: Updated service: id={}, capacity={}, slots={}, status={}",
            id, service.capacity, service.available_slots, service.status.as_str()
        );
        Ok(EditOutcome::Applied(service))
    }

    /// Get a listing by ID
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Service>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        Ok(load_service(&conn, id)?)
    }

    /// List active listings, best rated first
    pub async fn list_active(&self) -> Result<Vec<Service>> {
        self.list_where(
            "s.status = ?1 ORDER BY CAST(s.rating_average AS REAL) DESC, s.created_at DESC",
            &[ServiceStatus::Active.as_str()],
        )
        .await
    }

    /// List a provider's own listings
    pub async fn list_by_provider(&self, provider_id: &str) -> Result<Vec<Service>> {
        self.list_where("s.provider_id = ?1 ORDER BY s.created_at DESC", &[provider_id])
            .await
    }

    /// List every listing
    pub async fn list_all(&self) -> Result<Vec<Service>> {
        self.list_where("1 = 1 ORDER BY s.created_at DESC", &[]).await
    }

    async fn list_where(&self, clause: &str, args: &[&str]) -> Result<Vec<Service>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM services s LEFT JOIN users u ON u.id = s.provider_id WHERE {}",
            SERVICE_COLUMNS, clause
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), service_from_row)?;

        let mut services = Vec::new();
        for row in rows {
            services.push(row?);
        }
        Ok(services)
    }

    /// Change a listing's status, optionally only from `expected`
    ///
    /// Returns false when the listing is missing or not in `expected`.
    pub async fn set_status(
        &self,
        id: &str,
        expected: Option<ServiceStatus>,
        status: ServiceStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let updated = conn.execute(
            "UPDATE services SET status = ?1, updated_at = ?2 WHERE id = ?3 AND (?4 IS NULL OR status = ?4)",
            rusqlite::params![status.as_str(), at, id, expected.map(|s| s.as_str())],
        )?;
        if updated > 0 {
            info!("DB: Service status changed: id={}, status={}", id, status.as_str());
        }
        Ok(updated > 0)
    }

    /// Delete a listing, or archive it as inactive when past contracts
    /// reference it
    ///
    /// Refused while any contract against it is still open. The check and
    /// the write share one transaction.
    pub async fn remove(&self, id: &str, at: DateTime<Utc>) -> Result<RemoveOutcome> {
        let conn = self.db.conn();
        let mut conn = conn.lock().await;
        let tx = conn.transaction()?;

        let (open, total): (u32, u32) = tx.query_row(
            "SELECT COALESCE(SUM(CASE WHEN status NOT IN ('completed', 'cancelled', 'rejected') \
             THEN 1 ELSE 0 END), 0), COUNT(*) FROM contracts WHERE service_id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if open > 0 {
            return Ok(RemoveOutcome::OpenContracts(open));
        }

        let outcome = if total == 0 {
            if tx.execute("DELETE FROM services WHERE id = ?1", [id])? == 0 {
                return Ok(RemoveOutcome::Missing);
            }
            RemoveOutcome::Deleted
        } else {
            tx.execute(
                "UPDATE services SET status = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![ServiceStatus::Inactive.as_str(), at, id],
            )?;
            RemoveOutcome::Archived(total)
        };

        tx.commit()?;
        info!("DB: Removed service: id={}, outcome={:?}", id, outcome);
        Ok(outcome)
    }
}

/// Result of [`ServiceQueries::edit`]
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// The edit was written; the listing as stored afterwards
    Applied(Service),
    /// The edit is invalid for the listing's current state
    Rejected(String),
    /// No such listing
    Missing,
}

/// Result of [`ServiceQueries::remove`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The listing was deleted
    Deleted,
    /// The listing was kept as inactive; carries the number of past contracts
    Archived(u32),
    /// Contracts against the listing are still open
    OpenContracts(u32),
    /// No such listing
    Missing,
}

fn load_service(conn: &Connection, id: &str) -> rusqlite::Result<Option<Service>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM services s LEFT JOIN users u ON u.id = s.provider_id WHERE s.id = ?1",
            SERVICE_COLUMNS
        ),
        [id],
        service_from_row,
    )
    .optional()
}

const REVIEW_COLUMNS: &str = "r.id, r.service_id, r.client_id, COALESCE(u.full_name, ''), \
    r.contract_id, r.rating, r.safety_rating, r.review_text, r.categories, r.verified_booking, \
    r.created_at";

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        service_id: row.get(1)?,
        client_id: row.get(2)?,
        client_name: row.get(3)?,
        contract_id: row.get(4)?,
        rating: row.get(5)?,
        safety_rating: row.get(6)?,
        review_text: row.get(7)?,
        categories: json_column(row, 8)?,
        verified_booking: row.get::<_, i32>(9)? != 0,
        created_at: row.get(10)?,
    })
}

/// Review queries
pub struct ReviewQueries<'a> {
    db: &'a Database,
}

impl<'a> ReviewQueries<'a> {
    /// Create a new query instance
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Whether `client_id` already reviewed `service_id`
    pub async fn exists(&self, service_id: &str, client_id: &str) -> Result<bool> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reviews WHERE service_id = ?1 AND client_id = ?2",
            [service_id, client_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Insert a review and fold its rating into the listing aggregate
    ///
    /// Returns the listing's new rating.
    pub async fn insert_and_rate(&self, review: &Review) -> Result<ServiceRating> {
        let categories = review.categories.as_ref().map(to_json).transpose()?;

        let conn = self.db.conn();
        let mut conn = conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO reviews (id, service_id, client_id, contract_id, rating, safety_rating,
                                 review_text, categories, verified_booking, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            rusqlite::params![
                &review.id,
                &review.service_id,
                &review.client_id,
                &review.contract_id,
                review.rating,
                review.safety_rating,
                &review.review_text,
                categories,
                review.verified_booking,
                review.created_at,
            ],
        )?;

        let current = tx.query_row(
            "SELECT rating_average, rating_count FROM services WHERE id = ?1",
            [&review.service_id],
            |row| {
                Ok(ServiceRating {
                    average: parse_column(row, 0)?,
                    count: row.get(1)?,
                })
            },
        )?;
        let rating = current.with_rating(review.rating);

        tx.execute(
            "UPDATE services SET rating_average = ?1, rating_count = ?2 WHERE id = ?3",
            rusqlite::params![rating.average.to_string(), rating.count, &review.service_id],
        )?;
        tx.commit()?;

        info!(
            "DB: Inserted review: id={}, service_id={}, rating={}, new_average={}",
            review.id, review.service_id, review.rating, rating.average
        );
        Ok(rating)
    }

    /// Reviews of a listing, newest first
    pub async fn list_for_service(&self, service_id: &str) -> Result<Vec<Review>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reviews r LEFT JOIN users u ON u.id = r.client_id \
             WHERE r.service_id = ?1 ORDER BY r.created_at DESC",
            REVIEW_COLUMNS
        ))?;
        let rows = stmt.query_map([service_id], review_from_row)?;

        let mut reviews = Vec::new();
        for row in rows {
            reviews.push(row?);
        }
        Ok(reviews)
    }
}
