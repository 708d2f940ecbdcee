//! Contract mutations as a user performs them
//!
//! Each call to [`ContractWorkflow::perform`] issues at most one command.
//! Actions the contract does not currently offer are refused locally, a
//! second action on a contract whose mutation is still in flight is dropped,
//! and after a success the contract is always re-read from the backend rather
//! than patched locally.

use super::{
    cache::{QueryCache, QueryKey},
    ClientError, ClientResult, MarketClient,
};
use crate::domain::{
    available_actions, Contract, ContractAction, NewReview, PaymentRequest, Review, Role,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// What happened to a requested mutation
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The backend applied it; the contract as re-read afterwards
    Applied(Contract),
    /// Another mutation on the same contract had not finished; nothing was sent
    AlreadyInFlight,
}

/// Contract ids with a mutation in flight
#[derive(Default)]
struct InFlight {
    ids: Mutex<HashSet<String>>,
}

impl InFlight {
    fn begin(self: &Arc<Self>, id: &str) -> Option<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if ids.insert(id.to_string()) {
            Some(InFlightGuard {
                owner: self.clone(),
                id: id.to_string(),
            })
        } else {
            None
        }
    }

    fn contains(&self, id: &str) -> bool {
        let ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.contains(id)
    }
}

/// Releases the contract when dropped, whatever the outcome
struct InFlightGuard {
    owner: Arc<InFlight>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut ids = self.owner.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.remove(&self.id);
    }
}

/// Gated, single-flight contract mutations over a shared cache
#[derive(Clone)]
pub struct ContractWorkflow {
    client: Arc<MarketClient>,
    cache: Arc<QueryCache>,
    in_flight: Arc<InFlight>,
}

impl ContractWorkflow {
    /// Create a workflow over `client` and `cache`
    pub fn new(client: Arc<MarketClient>, cache: Arc<QueryCache>) -> Self {
        Self {
            client,
            cache,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// The underlying client
    pub fn client(&self) -> &MarketClient {
        &self.client
    }

    /// The shared cache
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Whether a mutation on `contract_id` has not finished yet
    ///
    /// Views disable every action control of the contract while this holds.
    pub fn is_busy(&self, contract_id: &str) -> bool {
        self.in_flight.contains(contract_id)
    }

    /// A contract, read through the cache
    pub async fn contract(&self, id: &str) -> ClientResult<Contract> {
        self.cache
            .get_or_fetch(QueryKey::Contract(id.to_string()), || {
                self.client.get_contract(id)
            })
            .await
    }

    /// Perform `action` on `contract` as `role`
    pub async fn perform(
        &self,
        role: Role,
        contract: &Contract,
        action: ContractAction,
    ) -> ClientResult<MutationOutcome> {
        if action == ContractAction::Review {
            return Err(ClientError::Validation(
                "Reviews are submitted with a rating and text".to_string(),
            ));
        }
        if !available_actions(role, contract).contains(&action) {
            return Err(ClientError::Validation(format!(
                "{} is not available for a {} contract",
                action.label(),
                contract.status
            )));
        }

        let Some(_guard) = self.in_flight.begin(&contract.id) else {
            debug!(
                "Ignoring {} on {}: a mutation is already in flight",
                action, contract.id
            );
            return Ok(MutationOutcome::AlreadyInFlight);
        };

        info!("Performing {} on contract {} as {}", action, contract.id, role);
        let invalidate = match action {
            ContractAction::Pay => {
                let (_, item) = contract.next_payable().ok_or_else(|| {
                    ClientError::Validation("No installment is due".to_string())
                })?;
                let req = PaymentRequest {
                    contract_id: contract.id.clone(),
                    amount: item.amount,
                    payment_method: self.client.payment_method().to_string(),
                };
                let payment = self.client.make_payment(&req).await?;
                info!(
                    "Paid installment {} of {}: txn={}",
                    payment.installment + 1,
                    contract.id,
                    payment.transaction_id
                );
                QueryKey::payment_scope(contract)
            }
            _ => {
                self.command(&contract.id, action).await?;
                QueryKey::contract_scope(contract)
            }
        };

        self.cache.invalidate(&invalidate).await;
        let fresh = self.client.get_contract(&contract.id).await.map_err(|e| {
            warn!("Re-reading {} after {} failed: {}", contract.id, action, e);
            e
        })?;
        self.cache
            .put(QueryKey::Contract(fresh.id.clone()), &fresh)
            .await?;

        Ok(MutationOutcome::Applied(fresh))
    }

    async fn command(&self, id: &str, action: ContractAction) -> ClientResult<Contract> {
        match action {
            ContractAction::Accept => self.client.provider_accept(id).await,
            ContractAction::Reject => self.client.provider_reject(id).await,
            ContractAction::Confirm => self.client.client_confirm(id).await,
            ContractAction::Complete => self.client.complete(id).await,
            ContractAction::Cancel => self.client.cancel(id).await,
            ContractAction::Pay | ContractAction::Review => Err(ClientError::Validation(format!(
                "{} is not a status change",
                action.label()
            ))),
        }
    }

    /// Review the service of a completed `contract`
    pub async fn review(
        &self,
        contract: &Contract,
        rating: u8,
        safety_rating: u8,
        review_text: &str,
    ) -> ClientResult<Review> {
        if !available_actions(Role::Client, contract).contains(&ContractAction::Review) {
            return Err(ClientError::Validation(
                "Only completed contracts can be reviewed".to_string(),
            ));
        }
        let req = NewReview {
            service_id: contract.service_id.clone(),
            rating,
            safety_rating,
            review_text: review_text.to_string(),
            categories: None,
        };
        req.validate().map_err(ClientError::Validation)?;

        let review = self.client.create_review(&req).await?;
        self.cache
            .invalidate(&[
                QueryKey::Service(contract.service_id.clone()),
                QueryKey::ServiceReviews(contract.service_id.clone()),
            ])
            .await;
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Session;
    use crate::config::ClientConfig;
    use crate::domain::actions::tests::contract_in;
    use crate::domain::ContractStatus;

    fn offline_workflow() -> ContractWorkflow {
        let config = ClientConfig {
            base_url: "http://127.0.0.1:9/api".to_string(),
            timeout_seconds: 2,
            payment_method: "mock_card".to_string(),
        };
        let client = MarketClient::new(&config, Session::in_memory()).unwrap();
        ContractWorkflow::new(Arc::new(client), Arc::new(QueryCache::default()))
    }

    #[tokio::test]
    async fn test_refuses_actions_not_offered() {
        let workflow = offline_workflow();
        let pending = contract_in(ContractStatus::PendingProviderApproval, 2);

        let err = workflow
            .perform(Role::Client, &pending, ContractAction::Confirm)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));

        let rejected = contract_in(ContractStatus::Rejected, 2);
        for action in [ContractAction::Cancel, ContractAction::Accept] {
            let err = workflow
                .perform(Role::ServiceProvider, &rejected, action)
                .await
                .unwrap_err();
            assert!(matches!(err, ClientError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_in_flight_contract_drops_second_mutation() {
        let workflow = offline_workflow();
        let contract = contract_in(ContractStatus::PendingProviderApproval, 2);

        let guard = workflow.in_flight.begin(&contract.id).unwrap();
        assert!(workflow.is_busy(&contract.id));
        let outcome = workflow
            .perform(Role::ServiceProvider, &contract, ContractAction::Accept)
            .await
            .unwrap();
        assert_eq!(outcome, MutationOutcome::AlreadyInFlight);

        drop(guard);
        assert!(!workflow.is_busy(&contract.id));
    }

    #[tokio::test]
    async fn test_failed_mutation_releases_contract_and_keeps_cache() {
        let workflow = offline_workflow();
        let contract = contract_in(ContractStatus::PendingProviderApproval, 2);
        let key = QueryKey::Contract(contract.id.clone());
        workflow.cache.put(key.clone(), &contract).await.unwrap();

        let err = workflow
            .perform(Role::ServiceProvider, &contract, ContractAction::Accept)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
        assert!(!workflow.is_busy(&contract.id));
        assert!(workflow.cache.contains(&key).await);
    }
}
