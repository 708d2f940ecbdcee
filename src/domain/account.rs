//! Users, roles and verification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role a user acts under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Books services
    #[serde(alias = "student")]
    Client,
    /// Publishes listings and approves contracts
    ServiceProvider,
    /// Moderates users and listings
    Admin,
}

impl Role {
    /// Wire and storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::ServiceProvider => "service_provider",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" | "student" => Ok(Role::Client),
            "service_provider" => Ok(Role::ServiceProvider),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Kind of client account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Enrolled student
    Student,
    /// University employee
    Employee,
}

impl ClientType {
    /// Wire and storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Student => "student",
            ClientType::Employee => "employee",
        }
    }
}

impl FromStr for ClientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(ClientType::Student),
            "employee" => Ok(ClientType::Employee),
            other => Err(format!("unknown client type: {}", other)),
        }
    }
}

/// Identity verification state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// No document submitted
    #[default]
    Unverified,
    /// Document submitted, awaiting an admin
    Pending,
    /// Approved by an admin
    Verified,
    /// Refused by an admin
    Rejected,
}

impl VerificationStatus {
    /// Wire and storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(VerificationStatus::Unverified),
            "pending" => Ok(VerificationStatus::Pending),
            "verified" => Ok(VerificationStatus::Verified),
            "rejected" => Ok(VerificationStatus::Rejected),
            other => Err(format!("unknown verification status: {}", other)),
        }
    }
}

/// Public profile of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Display name
    pub full_name: String,
    /// Student or employee, for clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_type: Option<ClientType>,
    /// University the client belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    /// Student ID number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,
    /// Verification status
    #[serde(default)]
    pub verification_status: VerificationStatus,
    /// Reference to the submitted document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_document: Option<String>,
    /// Why an admin refused verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_rejected_reason: Option<String>,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Most recent successful login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: String,
    /// Login email, lower-cased
    pub email: String,
    /// Role
    pub role: Role,
    /// Profile
    pub profile: UserProfile,
    /// Average safety rating from reviews
    pub safety_score: f64,
    /// Deactivated accounts cannot sign in
    pub is_active: bool,
}

impl User {
    /// Whether an admin has approved this user
    pub fn is_verified(&self) -> bool {
        self.profile.verification_status == VerificationStatus::Verified
    }

    /// Why this user may not transact yet, if anything blocks them
    pub fn verification_block(&self) -> Option<String> {
        if self.role == Role::Admin {
            return None;
        }
        match self.profile.verification_status {
            VerificationStatus::Verified => None,
            VerificationStatus::Pending => Some(
                "Your account verification is pending. Please wait for admin approval.".to_string(),
            ),
            VerificationStatus::Rejected => Some(match &self.profile.verification_rejected_reason {
                Some(reason) => format!("Your account verification was rejected: {}", reason),
                None => "Your account verification was rejected.".to_string(),
            }),
            VerificationStatus::Unverified => Some(
                "Please submit a verification document before using this feature.".to_string(),
            ),
        }
    }
}

/// Registration payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Email
    pub email: String,
    /// Plain-text password, hashed before storage
    pub password: String,
    /// Client or service provider
    pub role: Role,
    /// Full name
    pub full_name: String,
    /// Required for clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_type: Option<ClientType>,
    /// University
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    /// Student number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,
    /// Document submitted with the registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_document: Option<String>,
}

impl RegisterRequest {
    /// Check the payload before anything is stored
    pub fn validate(&self, min_password_length: usize) -> Result<(), String> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err("A valid email address is required".to_string());
        }
        if self.password.chars().count() < min_password_length {
            return Err(format!(
                "Password must be at least {} characters",
                min_password_length
            ));
        }
        if self.full_name.trim().is_empty() {
            return Err("Full name is required".to_string());
        }
        match self.role {
            Role::Client if self.client_type.is_none() => {
                Err("Client type is required for clients (student or employee)".to_string())
            }
            Role::Admin => Err("Admin accounts cannot be self-registered".to_string()),
            _ => Ok(()),
        }
    }
}

/// Login payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Email
    pub email: String,
    /// Password
    pub password: String,
}

/// Token issued on register or login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Bearer token
    pub access_token: String,
    /// Always `bearer`
    pub token_type: String,
    /// The signed-in user
    pub user: User,
}

/// Document reference submitted for verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSubmission {
    /// Reference to the uploaded document
    pub document: String,
}

/// Admin decision on a pending verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationDecision {
    /// User under review
    pub user_id: String,
    /// `verified` or `rejected`
    pub decision: VerificationStatus,
    /// Required when rejecting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl VerificationDecision {
    /// A decision must be final and a rejection must say why
    pub fn validate(&self) -> Result<(), String> {
        match self.decision {
            VerificationStatus::Verified => Ok(()),
            VerificationStatus::Rejected => match self.rejection_reason.as_deref().map(str::trim) {
                Some(reason) if !reason.is_empty() => Ok(()),
                _ => Err("A rejection reason is required".to_string()),
            },
            other => Err(format!(
                "Decision must be verified or rejected, got {}",
                other.as_str()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(role: Role, client_type: Option<ClientType>) -> RegisterRequest {
        RegisterRequest {
            email: "amal@example.edu".to_string(),
            password: "secret123".to_string(),
            role,
            full_name: "Amal".to_string(),
            client_type,
            university: None,
            student_number: None,
            verification_document: None,
        }
    }

    #[test]
    fn test_client_registration_requires_client_type() {
        assert!(register(Role::Client, None).validate(8).is_err());
        assert!(register(Role::Client, Some(ClientType::Employee)).validate(8).is_ok());
        assert!(register(Role::ServiceProvider, None).validate(8).is_ok());
        assert!(register(Role::Admin, None).validate(8).is_err());
    }

    #[test]
    fn test_short_password_rejected() {
        let mut req = register(Role::ServiceProvider, None);
        req.password = "abc".to_string();
        assert!(req.validate(8).is_err());
    }

    #[test]
    fn test_rejection_requires_reason() {
        let mut decision = VerificationDecision {
            user_id: "u1".to_string(),
            decision: VerificationStatus::Rejected,
            rejection_reason: Some("  ".to_string()),
        };
        assert!(decision.validate().is_err());

        decision.rejection_reason = Some("blurry document".to_string());
        assert!(decision.validate().is_ok());

        decision.decision = VerificationStatus::Pending;
        assert!(decision.validate().is_err());
    }

    #[test]
    fn test_role_accepts_legacy_student() {
        let role: Role = serde_json::from_str("\"student\"").unwrap();
        assert_eq!(role, Role::Client);
        assert_eq!(serde_json::to_string(&Role::ServiceProvider).unwrap(), "\"service_provider\"");
    }
}
