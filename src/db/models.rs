//! Database models and column conversions

use crate::domain::{User, UserProfile};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use std::str::FromStr;

/// A user row, including the password hash never sent to clients
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// The public user
    pub user: User,
    /// Argon2id PHC string of the password
    pub password_hash: String,
}

/// Session token row
#[derive(Debug, Clone)]
pub struct SessionModel {
    /// Bearer token
    pub token: String,
    /// Owner of the session
    pub user_id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
}

/// Read a TEXT column through `FromStr`
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

/// Read a nullable TEXT column through `FromStr`
pub(crate) fn parse_optional_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        t.parse::<T>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
    })
    .transpose()
}

/// Read a nullable JSON column
pub(crate) fn json_column<T: DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        serde_json::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Serialize a value for a JSON column
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Columns selected by every user query, in [`user_from_row`] order
pub(crate) const USER_COLUMNS: &str = "id, email, password_hash, role, full_name, client_type, \
    university, student_number, verification_status, verification_document, \
    verification_rejected_reason, safety_score, is_active, created_at, last_login";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        user: User {
            id: row.get(0)?,
            email: row.get(1)?,
            role: parse_column(row, 3)?,
            profile: UserProfile {
                full_name: row.get(4)?,
                client_type: parse_optional_column(row, 5)?,
                university: row.get(6)?,
                student_number: row.get(7)?,
                verification_status: parse_column(row, 8)?,
                verification_document: row.get(9)?,
                verification_rejected_reason: row.get(10)?,
                created_at: row.get(13)?,
                last_login: row.get(14)?,
            },
            safety_score: row.get(11)?,
            is_active: row.get::<_, i32>(12)? != 0,
        },
        password_hash: row.get(2)?,
    })
}
