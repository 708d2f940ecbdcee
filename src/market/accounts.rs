//! Accounts, sessions and identity verification

use super::{db_error, require_role, MarketService};
use crate::{
    db::{SessionModel, SessionQueries, UserQueries, UserRecord},
    domain::{
        AuthResponse, LoginRequest, RegisterRequest, Role, User, UserProfile,
        VerificationDecision, VerificationStatus,
    },
    MarketError, MarketResult,
};
use argon2::Argon2;
use chrono::{Duration, Utc};
use password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use tracing::{info, warn};

const DEFAULT_SAFETY_SCORE: f64 = 100.0;

/// Argon2id hash of `password` as a PHC string
pub fn hash_password(password: &str) -> MarketResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| MarketError::Validation(format!("Password cannot be hashed: {}", e)))
}

/// Check `password` against a stored PHC string
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Email addresses are stored and looked up trimmed and lowercased
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl MarketService {
    /// Register a client or provider and open a session
    pub async fn register(&self, req: RegisterRequest) -> MarketResult<AuthResponse> {
        info!("Registering user: email={}, role={}", req.email, req.role);

        req.validate(self.config.auth.min_password_length)
            .map_err(MarketError::Validation)?;

        let email = normalize_email(&req.email);
        let users = UserQueries::new(&self.db);
        if users
            .get_by_email(&email)
            .await
            .map_err(db_error("Failed to look up email"))?
            .is_some()
        {
            return Err(MarketError::Conflict("Email already registered".to_string()));
        }

        let document = req
            .verification_document
            .filter(|d| !d.trim().is_empty());
        let verification_status = if document.is_some() {
            VerificationStatus::Pending
        } else {
            VerificationStatus::Unverified
        };

        let record = UserRecord {
            user: User {
                id: uuid::Uuid::new_v4().to_string(),
                email,
                role: req.role,
                profile: UserProfile {
                    full_name: req.full_name.trim().to_string(),
                    client_type: req.client_type.filter(|_| req.role == Role::Client),
                    university: req.university,
                    student_number: req.student_number,
                    verification_status,
                    verification_document: document,
                    verification_rejected_reason: None,
                    created_at: Utc::now(),
                    last_login: None,
                },
                safety_score: DEFAULT_SAFETY_SCORE,
                is_active: true,
            },
            password_hash: hash_password(&req.password)?,
        };

        users
            .insert(&record)
            .await
            .map_err(db_error("Failed to store user"))?;

        self.open_session(record.user).await
    }

    /// Exchange credentials for a session token
    pub async fn login(&self, req: LoginRequest) -> MarketResult<AuthResponse> {
        info!("Login attempt: email={}", req.email);

        let users = UserQueries::new(&self.db);
        let record = users
            .get_by_email(&normalize_email(&req.email))
            .await
            .map_err(db_error("Failed to look up user"))?
            .filter(|r| verify_password(&req.password, &r.password_hash))
            .ok_or_else(|| {
                warn!("Failed login for {}", req.email);
                MarketError::Unauthorized("Invalid email or password".to_string())
            })?;

        if !record.user.is_active {
            return Err(MarketError::Forbidden("This account has been suspended".to_string()));
        }

        let now = Utc::now();
        users
            .touch_login(&record.user.id, now)
            .await
            .map_err(db_error("Failed to record login"))?;

        let mut user = record.user;
        user.profile.last_login = Some(now);
        self.open_session(user).await
    }

    async fn open_session(&self, user: User) -> MarketResult<AuthResponse> {
        let now = Utc::now();
        let session = SessionModel {
            token: uuid::Uuid::new_v4().simple().to_string(),
            user_id: user.id.clone(),
            created_at: now,
            expires_at: now + Duration::hours(self.config.auth.session_ttl_hours),
        };

        let sessions = SessionQueries::new(&self.db);
        sessions
            .purge_expired(now)
            .await
            .map_err(db_error("Failed to purge sessions"))?;
        sessions
            .insert(&session)
            .await
            .map_err(db_error("Failed to store session"))?;

        Ok(AuthResponse {
            access_token: session.token,
            token_type: "bearer".to_string(),
            user,
        })
    }

    /// Resolve a bearer token to its user
    pub async fn authenticate(&self, token: &str) -> MarketResult<User> {
        let user_id = SessionQueries::new(&self.db)
            .user_for_token(token, Utc::now())
            .await
            .map_err(db_error("Failed to look up session"))?
            .ok_or_else(|| MarketError::Unauthorized("Invalid or expired token".to_string()))?;

        let user = self.user(&user_id).await.map_err(|e| match e {
            MarketError::NotFound(_) => MarketError::Unauthorized("User not found".to_string()),
            other => other,
        })?;

        if !user.is_active {
            return Err(MarketError::Unauthorized("This account has been suspended".to_string()));
        }
        Ok(user)
    }

    /// Revoke a session token
    pub async fn logout(&self, token: &str) -> MarketResult<()> {
        SessionQueries::new(&self.db)
            .delete(token)
            .await
            .map_err(db_error("Failed to revoke session"))?;
        info!("Session revoked");
        Ok(())
    }

    /// Look up a user by ID
    pub async fn user(&self, id: &str) -> MarketResult<User> {
        UserQueries::new(&self.db)
            .get_by_id(id)
            .await
            .map_err(db_error("Failed to load user"))?
            .map(|r| r.user)
            .ok_or_else(|| MarketError::NotFound(format!("User {}", id)))
    }

    /// Submit a verification document for admin review
    pub async fn submit_verification(&self, caller: &User, document: &str) -> MarketResult<User> {
        if document.trim().is_empty() {
            return Err(MarketError::Validation("A verification document is required".to_string()));
        }
        if caller.is_verified() {
            return Err(MarketError::Conflict("Account is already verified".to_string()));
        }

        UserQueries::new(&self.db)
            .submit_verification(&caller.id, document.trim())
            .await
            .map_err(db_error("Failed to store verification"))?;

        info!("Verification submitted: user_id={}", caller.id);
        self.user(&caller.id).await
    }

    /// Create the admin account if no user holds its email yet
    pub async fn seed_admin(&self, email: &str, full_name: &str, password: &str) -> MarketResult<User> {
        let email = normalize_email(email);
        let users = UserQueries::new(&self.db);
        if let Some(existing) = users
            .get_by_email(&email)
            .await
            .map_err(db_error("Failed to look up admin"))?
        {
            return Ok(existing.user);
        }

        let record = UserRecord {
            user: User {
                id: uuid::Uuid::new_v4().to_string(),
                email,
                role: Role::Admin,
                profile: UserProfile {
                    full_name: full_name.to_string(),
                    client_type: None,
                    university: None,
                    student_number: None,
                    verification_status: VerificationStatus::Verified,
                    verification_document: None,
                    verification_rejected_reason: None,
                    created_at: Utc::now(),
                    last_login: None,
                },
                safety_score: DEFAULT_SAFETY_SCORE,
                is_active: true,
            },
            password_hash: hash_password(password)?,
        };
        users
            .insert(&record)
            .await
            .map_err(db_error("Failed to store admin"))?;

        info!("Seeded admin account: {}", record.user.email);
        Ok(record.user)
    }

    /// Every user, for admins
    pub async fn list_users(&self, caller: &User) -> MarketResult<Vec<User>> {
        require_role(caller, Role::Admin)?;
        let records = UserQueries::new(&self.db)
            .list_all()
            .await
            .map_err(db_error("Failed to list users"))?;
        Ok(records.into_iter().map(|r| r.user).collect())
    }

    /// Users waiting for a verification decision, for admins
    pub async fn pending_verifications(&self, caller: &User) -> MarketResult<Vec<User>> {
        require_role(caller, Role::Admin)?;
        let records = UserQueries::new(&self.db)
            .list_pending_verification()
            .await
            .map_err(db_error("Failed to list verifications"))?;
        Ok(records.into_iter().map(|r| r.user).collect())
    }

    /// Approve or reject a user's verification
    pub async fn verify_user(&self, caller: &User, decision: VerificationDecision) -> MarketResult<User> {
        require_role(caller, Role::Admin)?;
        decision.validate().map_err(MarketError::Validation)?;

        let target = self.user(&decision.user_id).await?;
        if target.role == Role::Admin {
            return Err(MarketError::Validation("Admins are not subject to verification".to_string()));
        }

        let reason = match decision.decision {
            VerificationStatus::Rejected => decision.rejection_reason.as_deref().map(str::trim),
            _ => None,
        };
        UserQueries::new(&self.db)
            .set_verification(&target.id, decision.decision, reason)
            .await
            .map_err(db_error("Failed to store verification decision"))?;

        info!(
            "Verification decision: user_id={}, decision={}, by={}",
            target.id,
            decision.decision.as_str(),
            caller.id
        );
        self.user(&target.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::fixture;

    #[test]
    fn test_password_hash() {
        let stored = hash_password("hunter22").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
        assert!(!verify_password("hunter22", "not-a-phc-string"));
        assert_ne!(stored, hash_password("hunter22").unwrap());
    }

    #[tokio::test]
    async fn test_login_and_token_lifecycle() {
        let f = fixture(1, false).await;
        let auth = f
            .market
            .login(LoginRequest {
                email: "AMAL@student.test".to_string(),
                password: "password2".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(auth.user.id, f.client.id);
        assert!(auth.user.profile.last_login.is_some());

        let user = f.market.authenticate(&auth.access_token).await.unwrap();
        assert_eq!(user.id, f.client.id);

        f.market.logout(&auth.access_token).await.unwrap();
        assert!(matches!(
            f.market.authenticate(&auth.access_token).await,
            Err(MarketError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_and_duplicate_email() {
        let f = fixture(1, false).await;
        let err = f
            .market
            .login(LoginRequest {
                email: "amal@student.test".to_string(),
                password: "nope-nope".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));

        let err = f
            .market
            .register(RegisterRequest {
                email: "amal@student.test".to_string(),
                password: "password9".to_string(),
                role: Role::ServiceProvider,
                full_name: "Other".to_string(),
                client_type: None,
                university: None,
                student_number: None,
                verification_document: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));

        let err = f
            .market
            .register(RegisterRequest {
                email: "  Amal@Student.test ".to_string(),
                password: "password9".to_string(),
                role: Role::Client,
                full_name: "Padded".to_string(),
                client_type: Some(crate::domain::ClientType::Student),
                university: None,
                student_number: None,
                verification_document: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_verification_flow() {
        let f = fixture(1, false).await;
        let auth = f
            .market
            .register(RegisterRequest {
                email: "driver@provider.test".to_string(),
                password: "password4".to_string(),
                role: Role::ServiceProvider,
                full_name: "Driver".to_string(),
                client_type: None,
                university: None,
                student_number: None,
                verification_document: None,
            })
            .await
            .unwrap();
        assert_eq!(auth.user.profile.verification_status, VerificationStatus::Unverified);

        let pending = f.market.submit_verification(&auth.user, "licence-77").await.unwrap();
        assert_eq!(pending.profile.verification_status, VerificationStatus::Pending);
        let queue = f.market.pending_verifications(&f.admin).await.unwrap();
        assert!(queue.iter().any(|u| u.id == pending.id));

        let rejected = f
            .market
            .verify_user(
                &f.admin,
                VerificationDecision {
                    user_id: pending.id.clone(),
                    decision: VerificationStatus::Rejected,
                    rejection_reason: Some("expired licence".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.profile.verification_status, VerificationStatus::Rejected);
        assert!(rejected
            .verification_block()
            .unwrap()
            .contains("expired licence"));

        assert!(f
            .market
            .verify_user(
                &f.client,
                VerificationDecision {
                    user_id: pending.id,
                    decision: VerificationStatus::Verified,
                    rejection_reason: None,
                },
            )
            .await
            .is_err());
    }
}
