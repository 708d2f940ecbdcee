//! Marketplace core functionality
//!
//! This module implements the business rules the backend enforces:
//! - Contract creation and the provider/client approval handshake
//! - Status transitions as compare-and-set writes with slot accounting
//! - FIFO installment payments with the platform revenue split
//! - Accounts, verification, listings, reviews and direct messages

use crate::{
    config::Config,
    db::{ContractQueries, Database, ServiceQueries, SlotChange, UserQueries, WriteOutcome},
    domain::{
        terms, Contract, ContractDraft, ContractStatus, NewContract, Role, Transition, User,
    },
    fee::FeePolicy,
    MarketError, MarketResult,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

mod accounts;
mod listings;
mod messaging;
mod payments;
mod reviews;

pub use accounts::{hash_password, verify_password};

/// Wrap a store failure with what was being attempted
pub(crate) fn db_error(context: &'static str) -> impl FnOnce(anyhow::Error) -> MarketError {
    move |e| MarketError::Database(format!("{}: {}", context, e))
}

/// The marketplace service that owns every state change
pub struct MarketService {
    /// Configuration
    config: Arc<Config>,
    /// Database connection
    db: Arc<Database>,
    /// Revenue split applied to payments
    fees: FeePolicy,
}

impl MarketService {
    /// Create a new marketplace service
    pub fn new(config: Arc<Config>, db: Arc<Database>) -> Self {
        let fees = config.marketplace.fee_policy();
        Self { config, db, fees }
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create a contract for `caller` against a listing
    ///
    /// The contract starts pending provider approval, or awaiting the
    /// client's confirmation when the listing accepts automatically.
    pub async fn create_contract(&self, caller: &User, req: NewContract) -> MarketResult<Contract> {
        info!(
            "Creating contract: client_id={}, service_id={}, start={}, months={}",
            caller.id, req.service_id, req.start_date, req.duration_months
        );

        if caller.role != Role::Client {
            return Err(MarketError::Forbidden(
                "Only clients can create contracts".to_string(),
            ));
        }
        if let Some(reason) = caller.verification_block() {
            return Err(MarketError::Forbidden(reason));
        }

        let market = &self.config.marketplace;
        if req.duration_months < market.min_duration_months
            || req.duration_months > market.max_duration_months
        {
            return Err(MarketError::Validation(format!(
                "Duration must be between {} and {} months",
                market.min_duration_months, market.max_duration_months
            )));
        }

        let service = ServiceQueries::new(&self.db)
            .get_by_id(&req.service_id)
            .await
            .map_err(db_error("Failed to load service"))?
            .ok_or_else(|| MarketError::NotFound(format!("Service {}", req.service_id)))?;

        if !service.accepts_contracts() {
            return Err(if service.available_slots == 0 {
                MarketError::Conflict("No available slots left for this service".to_string())
            } else {
                MarketError::Validation("This service is not currently available".to_string())
            });
        }
        if service.provider_id == caller.id {
            return Err(MarketError::Validation(
                "You cannot contract your own service".to_string(),
            ));
        }

        let provider = UserQueries::new(&self.db)
            .get_by_id(&service.provider_id)
            .await
            .map_err(db_error("Failed to load provider"))?
            .ok_or_else(|| MarketError::NotFound(format!("Provider {}", service.provider_id)))?
            .user;
        if !provider.is_verified() || !provider.is_active {
            return Err(MarketError::Validation(
                "The service provider is not verified".to_string(),
            ));
        }

        let now = Utc::now();
        let draft = ContractDraft {
            service_id: service.id.clone(),
            client_id: caller.id.clone(),
            provider_id: provider.id.clone(),
            start_date: req.start_date,
            duration_months: req.duration_months,
            monthly_amount: service.price_monthly,
            currency: market.currency.clone(),
        };
        let mut contract = draft
            .build(uuid::Uuid::new_v4().to_string(), String::new(), now)
            .map_err(|e| MarketError::Validation(e.to_string()))?;

        contract.auto_generated_terms = terms::generate(&terms::TermsInput {
            platform: &market.name,
            service: &service,
            provider_name: &provider.profile.full_name,
            provider_safety_score: provider.safety_score,
            client_name: &caller.profile.full_name,
            university: caller.profile.university.as_deref(),
            student_number: caller.profile.student_number.as_deref(),
            start_date: contract.start_date,
            end_date: contract.end_date,
            duration_months: contract.duration_months,
            monthly_amount: contract.monthly_amount,
            total_amount: contract.total_amount,
            currency: &contract.currency,
            schedule: &contract.payment_schedule,
            issued_on: now.date_naive(),
        });

        contract.transition(Transition::Submit, Role::Client, now)?;
        if service.auto_accept {
            contract.transition(Transition::ProviderAccept, Role::ServiceProvider, now)?;
            debug!("Service {} auto-accepts; provider signature applied", service.id);
        }

        if let Err(violation) = contract.check_invariants() {
            warn!("Refusing inconsistent contract {}: {}", contract.id, violation);
            return Err(MarketError::Validation(violation.to_string()));
        }

        let queries = ContractQueries::new(&self.db);
        queries
            .insert(&contract)
            .await
            .map_err(db_error("Failed to store contract"))?;

        info!(
            "Contract created: id={}, status={}, total={} {}",
            contract.id, contract.status, contract.total_amount, contract.currency
        );

        self.load_contract(&contract.id).await
    }

    /// Get a contract visible to `caller`
    pub async fn get_contract(&self, caller: &User, id: &str) -> MarketResult<Contract> {
        let contract = self.load_contract(id).await?;
        if caller.role != Role::Admin && contract.party_role(&caller.id).is_none() {
            return Err(MarketError::Forbidden(
                "Not authorized to view this contract".to_string(),
            ));
        }
        Ok(contract)
    }

    /// Contracts where `caller` is the client
    pub async fn client_contracts(&self, caller: &User) -> MarketResult<Vec<Contract>> {
        require_role(caller, Role::Client)?;
        ContractQueries::new(&self.db)
            .list_for_client(&caller.id)
            .await
            .map_err(db_error("Failed to list contracts"))
    }

    /// Contracts where `caller` is the provider
    pub async fn provider_contracts(&self, caller: &User) -> MarketResult<Vec<Contract>> {
        require_role(caller, Role::ServiceProvider)?;
        ContractQueries::new(&self.db)
            .list_for_provider(&caller.id)
            .await
            .map_err(db_error("Failed to list contracts"))
    }

    /// Contracts against one listing, for its owner or an admin
    pub async fn service_contracts(&self, caller: &User, service_id: &str) -> MarketResult<Vec<Contract>> {
        let service = ServiceQueries::new(&self.db)
            .get_by_id(service_id)
            .await
            .map_err(db_error("Failed to load service"))?
            .ok_or_else(|| MarketError::NotFound(format!("Service {}", service_id)))?;

        if caller.role != Role::Admin && service.provider_id != caller.id {
            return Err(MarketError::Forbidden(
                "Not authorized to view contracts of this service".to_string(),
            ));
        }

        ContractQueries::new(&self.db)
            .list_for_service(service_id)
            .await
            .map_err(db_error("Failed to list contracts"))
    }

    /// Every contract, for admins
    pub async fn all_contracts(&self, caller: &User) -> MarketResult<Vec<Contract>> {
        require_role(caller, Role::Admin)?;
        ContractQueries::new(&self.db)
            .list_all()
            .await
            .map_err(db_error("Failed to list contracts"))
    }

    /// Provider accepts a pending request
    pub async fn provider_accept(&self, caller: &User, id: &str) -> MarketResult<Contract> {
        self.transition(caller, id, Transition::ProviderAccept).await
    }

    /// Provider rejects a pending request
    pub async fn provider_reject(&self, caller: &User, id: &str) -> MarketResult<Contract> {
        self.transition(caller, id, Transition::ProviderReject).await
    }

    /// Client confirms an accepted contract, reserving a slot
    pub async fn client_confirm(&self, caller: &User, id: &str) -> MarketResult<Contract> {
        self.transition(caller, id, Transition::ClientConfirm).await
    }

    /// Either party cancels a contract that has not ended
    pub async fn cancel(&self, caller: &User, id: &str) -> MarketResult<Contract> {
        self.transition(caller, id, Transition::Cancel).await
    }

    /// Client marks an active contract complete
    pub async fn complete(&self, caller: &User, id: &str) -> MarketResult<Contract> {
        self.transition(caller, id, Transition::Complete).await
    }

    /// Sign on behalf of whichever party is due to sign next
    pub async fn sign(&self, caller: &User, id: &str) -> MarketResult<Contract> {
        let contract = self.get_contract(caller, id).await?;
        let transition = match (contract.party_role(&caller.id), contract.status) {
            (Some(Role::ServiceProvider), ContractStatus::PendingProviderApproval) => {
                Transition::ProviderAccept
            }
            (Some(Role::Client), ContractStatus::AwaitingClientConfirmation) => {
                Transition::ClientConfirm
            }
            _ => {
                return Err(MarketError::Validation(format!(
                    "No action needed: contract is {}",
                    contract.status
                )))
            }
        };
        self.transition(caller, id, transition).await
    }

    async fn transition(
        &self,
        caller: &User,
        id: &str,
        transition: Transition,
    ) -> MarketResult<Contract> {
        info!(
            "Contract transition requested: id={}, transition={}, user_id={}",
            id, transition, caller.id
        );

        let contract = self.load_contract(id).await?;
        let role = contract.party_role(&caller.id).ok_or_else(|| {
            MarketError::Forbidden(format!("Not authorized to {} this contract", transition))
        })?;

        let mut next = contract.clone();
        let previous = next.transition(transition, role, Utc::now())?;

        let slots = match transition {
            Transition::ClientConfirm => SlotChange::Reserve,
            Transition::Cancel if previous == ContractStatus::Active => SlotChange::Release,
            _ => SlotChange::None,
        };

        let outcome = ContractQueries::new(&self.db)
            .compare_and_set(&next, previous, slots)
            .await
            .map_err(db_error("Failed to update contract"))?;

        match outcome {
            WriteOutcome::Applied => {
                info!(
                    "Contract {}: {} -> {} by {}",
                    id, previous, next.status, role
                );
                self.load_contract(id).await
            }
            WriteOutcome::StatusChanged(current) => {
                warn!(
                    "Contract {} changed concurrently: expected {}, found {}",
                    id, previous, current
                );
                Err(MarketError::Conflict(format!(
                    "Contract was modified concurrently and is now {}",
                    current
                )))
            }
            WriteOutcome::NoSlots => Err(MarketError::Conflict(
                "No available slots left for this service".to_string(),
            )),
            WriteOutcome::Missing | WriteOutcome::InstallmentSettled => {
                Err(MarketError::NotFound(format!("Contract {}", id)))
            }
        }
    }

    async fn load_contract(&self, id: &str) -> MarketResult<Contract> {
        ContractQueries::new(&self.db)
            .get_by_id(id)
            .await
            .map_err(db_error("Failed to load contract"))?
            .ok_or_else(|| MarketError::NotFound(format!("Contract {}", id)))
    }
}

/// Reject callers that do not act under `role`
pub(crate) fn require_role(caller: &User, role: Role) -> MarketResult<()> {
    if caller.role == role {
        Ok(())
    } else {
        Err(MarketError::Forbidden(format!(
            "This action requires the {} role",
            role
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{
        listing::{
            GenderRestriction, ResidenceDetails, ResidenceType, ServiceLocation,
        },
        ClientType, NewService, RegisterRequest, Service, ServiceType, VerificationDecision,
        VerificationStatus,
    };
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    pub(crate) struct Fixture {
        pub market: MarketService,
        pub admin: User,
        pub provider: User,
        pub client: User,
        pub service: Service,
    }

    pub(crate) async fn fixture(slots: u32, auto_accept: bool) -> Fixture {
        let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
        let market = MarketService::new(Arc::new(Config::default()), db);

        let admin = market.seed_admin("admin@campus.test", "Admin", "adminpass").await.unwrap();

        let provider = market
            .register(RegisterRequest {
                email: "salim@provider.test".to_string(),
                password: "password1".to_string(),
                role: Role::ServiceProvider,
                full_name: "Salim".to_string(),
                client_type: None,
                university: None,
                student_number: None,
                verification_document: Some("cr-123".to_string()),
            })
            .await
            .unwrap()
            .user;
        let client = market
            .register(RegisterRequest {
                email: "amal@student.test".to_string(),
                password: "password2".to_string(),
                role: Role::Client,
                full_name: "Amal".to_string(),
                client_type: Some(ClientType::Student),
                university: Some("SQU".to_string()),
                student_number: Some("S1".to_string()),
                verification_document: Some("civil-id".to_string()),
            })
            .await
            .unwrap()
            .user;

        for user in [&provider, &client] {
            market
                .verify_user(
                    &admin,
                    VerificationDecision {
                        user_id: user.id.clone(),
                        decision: VerificationStatus::Verified,
                        rejection_reason: None,
                    },
                )
                .await
                .unwrap();
        }
        let provider = market.user(&provider.id).await.unwrap();
        let client = market.user(&client.id).await.unwrap();

        let service = market
            .create_service(
                &provider,
                NewService {
                    service_type: ServiceType::Residence,
                    title: "Room near SQU".to_string(),
                    description: "Quiet room".to_string(),
                    category: "room".to_string(),
                    price_monthly: Decimal::from(100),
                    capacity: slots,
                    location: ServiceLocation {
                        address: "Al Khoud".to_string(),
                        city: "Muscat".to_string(),
                        university_nearby: "SQU".to_string(),
                        coordinates: None,
                    },
                    transportation: None,
                    residence: Some(ResidenceDetails {
                        residence_type: ResidenceType::Room,
                        bedrooms: 1,
                        bathrooms: 1,
                        furnished: true,
                        amenities: vec!["wifi".to_string()],
                        gender_restriction: GenderRestriction::Female,
                        lease_duration_months: 6,
                    }),
                    auto_accept,
                },
            )
            .await
            .unwrap();

        Fixture {
            market,
            admin,
            provider,
            client,
            service,
        }
    }

    pub(crate) fn request(service: &Service, months: u32) -> NewContract {
        NewContract {
            service_id: service.id.clone(),
            start_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            duration_months: months,
        }
    }

    #[tokio::test]
    async fn test_create_contract_pending_with_schedule() {
        let f = fixture(2, false).await;
        let contract = f.market.create_contract(&f.client, request(&f.service, 3)).await.unwrap();

        assert_eq!(contract.status, ContractStatus::PendingProviderApproval);
        assert_eq!(contract.total_amount, Decimal::from(300));
        assert_eq!(contract.payment_schedule.len(), 3);
        assert_eq!(contract.client_name.as_deref(), Some("Amal"));
        assert_eq!(contract.service_title.as_deref(), Some("Room near SQU"));
        assert!(!contract.provider_signature.signed);
        assert!(contract.auto_generated_terms.contains("RESIDENCE RENTAL AGREEMENT"));
    }

    #[tokio::test]
    async fn test_auto_accept_skips_provider_approval() {
        let f = fixture(2, true).await;
        let contract = f.market.create_contract(&f.client, request(&f.service, 2)).await.unwrap();
        assert_eq!(contract.status, ContractStatus::AwaitingClientConfirmation);
        assert!(contract.provider_signature.signed);
    }

    #[tokio::test]
    async fn test_full_handshake_reserves_and_releases_slot() {
        let f = fixture(2, false).await;
        let contract = f.market.create_contract(&f.client, request(&f.service, 2)).await.unwrap();

        let accepted = f.market.provider_accept(&f.provider, &contract.id).await.unwrap();
        assert_eq!(accepted.status, ContractStatus::AwaitingClientConfirmation);

        let active = f.market.client_confirm(&f.client, &contract.id).await.unwrap();
        assert_eq!(active.status, ContractStatus::Active);
        assert!(active.client_signature.signed && active.provider_signature.signed);
        assert_eq!(f.market.get_service(&f.service.id).await.unwrap().available_slots, 1);

        let cancelled = f.market.cancel(&f.client, &contract.id).await.unwrap();
        assert_eq!(cancelled.status, ContractStatus::Cancelled);
        assert_eq!(f.market.get_service(&f.service.id).await.unwrap().available_slots, 2);
    }

    #[tokio::test]
    async fn test_cancel_before_activation_keeps_slots() {
        let f = fixture(1, false).await;
        let contract = f.market.create_contract(&f.client, request(&f.service, 2)).await.unwrap();
        f.market.cancel(&f.provider, &contract.id).await.unwrap();
        assert_eq!(f.market.get_service(&f.service.id).await.unwrap().available_slots, 1);
    }

    #[tokio::test]
    async fn test_wrong_party_and_wrong_status() {
        let f = fixture(2, false).await;
        let contract = f.market.create_contract(&f.client, request(&f.service, 2)).await.unwrap();

        let err = f.market.client_confirm(&f.client, &contract.id).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));

        let err = f.market.provider_accept(&f.client, &contract.id).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));

        let err = f.market.provider_accept(&f.admin, &contract.id).await.unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_reject_is_terminal() {
        let f = fixture(2, false).await;
        let contract = f.market.create_contract(&f.client, request(&f.service, 2)).await.unwrap();
        let rejected = f.market.provider_reject(&f.provider, &contract.id).await.unwrap();
        assert_eq!(rejected.status, ContractStatus::Rejected);

        assert!(f.market.cancel(&f.client, &contract.id).await.is_err());
        assert!(f.market.provider_accept(&f.provider, &contract.id).await.is_err());
    }

    #[tokio::test]
    async fn test_racing_transitions_have_one_winner() {
        let f = fixture(2, false).await;
        let contract = f.market.create_contract(&f.client, request(&f.service, 2)).await.unwrap();

        let (accept, reject) = tokio::join!(
            f.market.provider_accept(&f.provider, &contract.id),
            f.market.provider_reject(&f.provider, &contract.id),
        );
        assert!(accept.is_ok() != reject.is_ok());
        let loser = accept.err().or(reject.err()).unwrap();
        assert!(matches!(
            loser,
            MarketError::Conflict(_) | MarketError::InvalidTransition(_)
        ));
    }

    #[tokio::test]
    async fn test_confirm_without_slots_conflicts() {
        let f = fixture(1, false).await;
        let first = f.market.create_contract(&f.client, request(&f.service, 1)).await.unwrap();
        let second = f.market.create_contract(&f.client, request(&f.service, 1)).await.unwrap();
        f.market.provider_accept(&f.provider, &first.id).await.unwrap();
        f.market.provider_accept(&f.provider, &second.id).await.unwrap();

        f.market.client_confirm(&f.client, &first.id).await.unwrap();
        let err = f.market.client_confirm(&f.client, &second.id).await.unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));

        let second = f.market.get_contract(&f.client, &second.id).await.unwrap();
        assert_eq!(second.status, ContractStatus::AwaitingClientConfirmation);
    }

    #[tokio::test]
    async fn test_legacy_sign_routes_by_party() {
        let f = fixture(2, false).await;
        let contract = f.market.create_contract(&f.client, request(&f.service, 2)).await.unwrap();

        let err = f.market.sign(&f.client, &contract.id).await.unwrap_err();
        assert!(err.to_string().contains("No action needed"));

        let signed = f.market.sign(&f.provider, &contract.id).await.unwrap();
        assert_eq!(signed.status, ContractStatus::AwaitingClientConfirmation);
        let signed = f.market.sign(&f.client, &contract.id).await.unwrap();
        assert_eq!(signed.status, ContractStatus::Active);
    }

    #[tokio::test]
    async fn test_unverified_client_cannot_contract() {
        let f = fixture(2, false).await;
        let outsider = f
            .market
            .register(RegisterRequest {
                email: "new@student.test".to_string(),
                password: "password3".to_string(),
                role: Role::Client,
                full_name: "New".to_string(),
                client_type: Some(ClientType::Employee),
                university: None,
                student_number: None,
                verification_document: None,
            })
            .await
            .unwrap()
            .user;
        let err = f.market.create_contract(&outsider, request(&f.service, 2)).await.unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_contract_visibility() {
        let f = fixture(2, false).await;
        let contract = f.market.create_contract(&f.client, request(&f.service, 2)).await.unwrap();

        assert!(f.market.get_contract(&f.admin, &contract.id).await.is_ok());
        assert_eq!(f.market.provider_contracts(&f.provider).await.unwrap().len(), 1);
        assert_eq!(f.market.client_contracts(&f.client).await.unwrap().len(), 1);
        assert!(f.market.client_contracts(&f.provider).await.is_err());
        assert_eq!(
            f.market.service_contracts(&f.provider, &f.service.id).await.unwrap().len(),
            1
        );
        assert!(f.market.service_contracts(&f.client, &f.service.id).await.is_err());
        assert_eq!(f.market.all_contracts(&f.admin).await.unwrap().len(), 1);
    }
}
