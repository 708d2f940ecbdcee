//! Role-scoped contract projections
//!
//! Client, provider and admin each get their own list of contracts. The lists
//! share the status vocabulary but are fetched and cached independently; the
//! only link between them is invalidation by key.

use super::{
    cache::{QueryCache, QueryKey},
    ClientResult, MarketClient,
};
use crate::domain::{
    available_actions, status_style, Contract, ContractAction, ContractStatus, Role, StatusStyle,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// A contract as one role sees it in a list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractCard {
    /// Contract ID
    pub id: String,
    /// Listing title
    pub title: String,
    /// Name of the other party, or both parties for admins
    pub counterparty: String,
    /// Status
    pub status: ContractStatus,
    /// How the status is shown to this role
    pub style: StatusStyle,
    /// Start date
    pub start_date: NaiveDate,
    /// End date
    pub end_date: NaiveDate,
    /// Total amount
    pub total_amount: Decimal,
    /// Currency
    pub currency: String,
    /// Paid installments
    pub paid_installments: usize,
    /// Total installments
    pub total_installments: usize,
    /// Due date and amount of the next pending installment
    pub next_due: Option<(NaiveDate, Decimal)>,
    /// Actions offered to this role
    pub actions: Vec<ContractAction>,
}

impl ContractCard {
    /// Project `contract` for `role`
    pub fn project(role: Role, contract: &Contract) -> Self {
        let name = |n: &Option<String>| n.clone().unwrap_or_else(|| "Unknown".to_string());
        let counterparty = match role {
            Role::Client => name(&contract.provider_name),
            Role::ServiceProvider => name(&contract.client_name),
            Role::Admin => format!(
                "{} / {}",
                name(&contract.client_name),
                name(&contract.provider_name)
            ),
        };

        Self {
            id: contract.id.clone(),
            title: contract
                .service_title
                .clone()
                .unwrap_or_else(|| "Service contract".to_string()),
            counterparty,
            status: contract.status,
            style: status_style(role, contract.status),
            start_date: contract.start_date,
            end_date: contract.end_date,
            total_amount: contract.total_amount,
            currency: contract.currency.clone(),
            paid_installments: contract.paid_installments(),
            total_installments: contract.payment_schedule.len(),
            next_due: contract
                .next_payable()
                .map(|(_, item)| (item.due_date, item.amount)),
            actions: available_actions(role, contract),
        }
    }

    /// "paid/total" progress label
    pub fn progress(&self) -> String {
        format!("{}/{}", self.paid_installments, self.total_installments)
    }
}

/// Provider contracts grouped by what they need next
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderBoard {
    /// Requests waiting on the provider
    pub pending_approval: Vec<ContractCard>,
    /// Accepted, waiting on the client
    pub awaiting_client: Vec<ContractCard>,
    /// Running contracts
    pub active: Vec<ContractCard>,
    /// Completed, cancelled or rejected
    pub closed: Vec<ContractCard>,
}

impl ProviderBoard {
    /// Group `contracts` as the provider sees them
    pub fn build(contracts: &[Contract]) -> Self {
        let mut board = Self::default();
        for contract in contracts {
            let card = ContractCard::project(Role::ServiceProvider, contract);
            match contract.status {
                ContractStatus::Draft | ContractStatus::PendingProviderApproval => {
                    board.pending_approval.push(card)
                }
                ContractStatus::AwaitingClientConfirmation => board.awaiting_client.push(card),
                ContractStatus::Active => board.active.push(card),
                ContractStatus::Completed | ContractStatus::Cancelled | ContractStatus::Rejected => {
                    board.closed.push(card)
                }
            }
        }
        board
    }

    /// Requests waiting on the provider
    pub fn needs_attention(&self) -> usize {
        self.pending_approval.len()
    }
}

/// Cache key of `role`'s contract list
pub fn list_key(role: Role) -> QueryKey {
    match role {
        Role::Client => QueryKey::ClientContracts,
        Role::ServiceProvider => QueryKey::ProviderContracts,
        Role::Admin => QueryKey::AllContracts,
    }
}

/// `role`'s contracts, read through `cache`
pub async fn role_contracts(
    client: &MarketClient,
    cache: &QueryCache,
    role: Role,
) -> ClientResult<Vec<Contract>> {
    cache
        .get_or_fetch(list_key(role), || async move {
            match role {
                Role::Client => client.client_contracts().await,
                Role::ServiceProvider => client.provider_contracts().await,
                Role::Admin => client.all_contracts().await,
            }
        })
        .await
}

/// `role`'s contracts projected as cards
pub async fn contract_cards(
    client: &MarketClient,
    cache: &QueryCache,
    role: Role,
) -> ClientResult<Vec<ContractCard>> {
    let contracts = role_contracts(client, cache, role).await?;
    Ok(contracts
        .iter()
        .map(|c| ContractCard::project(role, c))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actions::tests::contract_in;
    use crate::domain::schedule::ScheduleStatus;

    #[test]
    fn test_card_progress_and_actions() {
        let mut contract = contract_in(ContractStatus::Active, 3);
        contract.provider_name = Some("Salim".to_string());
        contract.payment_schedule[0].status = ScheduleStatus::Paid;

        let card = ContractCard::project(Role::Client, &contract);
        assert_eq!(card.counterparty, "Salim");
        assert_eq!(card.progress(), "1/3");
        assert_eq!(card.next_due, Some((contract.payment_schedule[1].due_date, Decimal::from(100))));
        assert!(card.actions.contains(&ContractAction::Pay));
        assert_eq!(card.style.label, "Active");

        let admin = ContractCard::project(Role::Admin, &contract);
        assert!(admin.actions.is_empty());
        assert!(admin.style.background.is_some());
    }

    #[test]
    fn test_provider_board_groups() {
        let contracts = vec![
            contract_in(ContractStatus::PendingProviderApproval, 1),
            contract_in(ContractStatus::AwaitingClientConfirmation, 1),
            contract_in(ContractStatus::Active, 1),
            contract_in(ContractStatus::Rejected, 1),
            contract_in(ContractStatus::Completed, 1),
        ];
        let board = ProviderBoard::build(&contracts);
        assert_eq!(board.needs_attention(), 1);
        assert_eq!(board.awaiting_client.len(), 1);
        assert_eq!(board.active.len(), 1);
        assert_eq!(board.closed.len(), 2);
        assert!(board.closed.iter().all(|c| c.actions.is_empty()));
    }
}
