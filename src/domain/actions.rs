//! Per-role action gating and status presentation
//!
//! Both the backend and the client core consult [`available_actions`]; a
//! client never offers an action the backend would refuse for the contract's
//! current status.

use super::account::Role;
use super::contract::{Contract, ContractStatus, Transition};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Something a user can do to a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractAction {
    /// Provider approves a pending request
    Accept,
    /// Provider declines a pending request
    Reject,
    /// Client confirms an accepted contract
    Confirm,
    /// Client pays the next installment
    Pay,
    /// Either party marks an active contract complete
    Complete,
    /// Either party cancels before completion
    Cancel,
    /// Client reviews the service after completion
    Review,
}

impl ContractAction {
    /// Status transition this action issues, if any
    pub fn transition(&self) -> Option<Transition> {
        match self {
            ContractAction::Accept => Some(Transition::ProviderAccept),
            ContractAction::Reject => Some(Transition::ProviderReject),
            ContractAction::Confirm => Some(Transition::ClientConfirm),
            ContractAction::Complete => Some(Transition::Complete),
            ContractAction::Cancel => Some(Transition::Cancel),
            ContractAction::Pay | ContractAction::Review => None,
        }
    }

    /// Whether the action changes contract status
    pub fn is_transition(&self) -> bool {
        self.transition().is_some()
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractAction::Accept => "accept",
            ContractAction::Reject => "reject",
            ContractAction::Confirm => "confirm",
            ContractAction::Pay => "pay",
            ContractAction::Complete => "complete",
            ContractAction::Cancel => "cancel",
            ContractAction::Review => "review",
        }
    }

    /// Button label
    pub fn label(&self) -> &'static str {
        match self {
            ContractAction::Accept => "Accept",
            ContractAction::Reject => "Reject",
            ContractAction::Confirm => "Confirm & Sign",
            ContractAction::Pay => "Make Payment",
            ContractAction::Complete => "Mark Complete",
            ContractAction::Cancel => "Cancel Contract",
            ContractAction::Review => "Write Review",
        }
    }
}

impl fmt::Display for ContractAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions `role` may take on `contract` in its current state
pub fn available_actions(role: Role, contract: &Contract) -> Vec<ContractAction> {
    let status = contract.status;
    let mut actions = Vec::new();

    match role {
        Role::Client => {
            if status == ContractStatus::AwaitingClientConfirmation {
                actions.push(ContractAction::Confirm);
            }
            if status == ContractStatus::Active && contract.next_payable().is_some() {
                actions.push(ContractAction::Pay);
            }
            if status == ContractStatus::Active {
                actions.push(ContractAction::Complete);
            }
            if !status.is_terminal() {
                actions.push(ContractAction::Cancel);
            }
            if status == ContractStatus::Completed {
                actions.push(ContractAction::Review);
            }
        }
        Role::ServiceProvider => {
            if status == ContractStatus::PendingProviderApproval {
                actions.push(ContractAction::Accept);
                actions.push(ContractAction::Reject);
            }
            if !status.is_terminal() {
                actions.push(ContractAction::Cancel);
            }
        }
        Role::Admin => {}
    }

    actions
}

/// Whether `action` is currently offered to `role`
pub fn is_offered(role: Role, contract: &Contract, action: ContractAction) -> bool {
    available_actions(role, contract).contains(&action)
}

/// How a status is shown to one role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusStyle {
    /// Text shown for the status
    pub label: &'static str,
    /// Foreground colour
    pub color: &'static str,
    /// Badge background, when the status has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<&'static str>,
}

const fn style(label: &'static str, color: &'static str) -> StatusStyle {
    StatusStyle {
        label,
        color,
        background: None,
    }
}

const fn badge(label: &'static str, color: &'static str, background: &'static str) -> StatusStyle {
    StatusStyle {
        label,
        color,
        background: Some(background),
    }
}

const FALLBACK: StatusStyle = style("Unknown", "#6B7280");

const CLIENT_STYLES: &[(ContractStatus, StatusStyle)] = &[
    (ContractStatus::Draft, style("Draft", "#6B7280")),
    (ContractStatus::PendingProviderApproval, style("Pending Approval", "#F59E0B")),
    (ContractStatus::AwaitingClientConfirmation, style("Awaiting Confirmation", "#8B5CF6")),
    (ContractStatus::Active, style("Active", "#10B981")),
    (ContractStatus::Completed, style("Completed", "#6B7280")),
    (ContractStatus::Cancelled, style("Cancelled", "#EF4444")),
    (ContractStatus::Rejected, style("Rejected", "#EF4444")),
];

const PROVIDER_STYLES: &[(ContractStatus, StatusStyle)] = &[
    (ContractStatus::Draft, style("Draft", "#6B7280")),
    (ContractStatus::PendingProviderApproval, style("Needs Approval", "#F59E0B")),
    (ContractStatus::AwaitingClientConfirmation, style("Awaiting Client", "#3B82F6")),
    (ContractStatus::Active, style("Active", "#10B981")),
    (ContractStatus::Completed, style("Completed", "#2563EB")),
    (ContractStatus::Cancelled, style("Cancelled", "#EF4444")),
    (ContractStatus::Rejected, style("Rejected", "#EF4444")),
];

const ADMIN_STYLES: &[(ContractStatus, StatusStyle)] = &[
    (ContractStatus::Draft, badge("Draft", "#6B7280", "#F3F4F6")),
    (ContractStatus::PendingProviderApproval, badge("Pending Provider Approval", "#92400E", "#FEF3C7")),
    (ContractStatus::AwaitingClientConfirmation, badge("Awaiting Client Confirmation", "#3730A3", "#E0E7FF")),
    (ContractStatus::Active, badge("Active", "#065F46", "#D1FAE5")),
    (ContractStatus::Completed, badge("Completed", "#1E40AF", "#DBEAFE")),
    (ContractStatus::Cancelled, badge("Cancelled", "#991B1B", "#FEE2E2")),
    (ContractStatus::Rejected, badge("Rejected", "#6B7280", "#F3F4F6")),
];

fn styles_for(role: Role) -> &'static [(ContractStatus, StatusStyle)] {
    match role {
        Role::Client => CLIENT_STYLES,
        Role::ServiceProvider => PROVIDER_STYLES,
        Role::Admin => ADMIN_STYLES,
    }
}

/// Presentation of `status` for `role`
pub fn status_style(role: Role, status: ContractStatus) -> StatusStyle {
    styles_for(role)
        .iter()
        .find(|(s, _)| *s == status)
        .map(|(_, style)| *style)
        .unwrap_or(FALLBACK)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::contract::ContractDraft;
    use crate::domain::schedule::ScheduleStatus;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    pub(crate) fn contract_in(status: ContractStatus, months: u32) -> Contract {
        let mut contract = ContractDraft {
            service_id: "svc".to_string(),
            client_id: "client".to_string(),
            provider_id: "provider".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            duration_months: months,
            monthly_amount: Decimal::from(100),
            currency: "OMR".to_string(),
        }
        .build("c1".to_string(), String::new(), Utc::now())
        .unwrap();
        contract.status = status;
        contract
    }

    #[test]
    fn test_confirm_only_when_awaiting() {
        for status in ContractStatus::ALL {
            let offered = is_offered(Role::Client, &contract_in(status, 2), ContractAction::Confirm);
            assert_eq!(offered, status == ContractStatus::AwaitingClientConfirmation);
        }
    }

    #[test]
    fn test_pay_requires_active_and_pending_item() {
        for status in ContractStatus::ALL {
            let offered = is_offered(Role::Client, &contract_in(status, 2), ContractAction::Pay);
            assert_eq!(offered, status == ContractStatus::Active);
        }

        let mut contract = contract_in(ContractStatus::Active, 1);
        contract.payment_schedule[0].status = ScheduleStatus::Paid;
        assert!(!is_offered(Role::Client, &contract, ContractAction::Pay));
        assert!(is_offered(Role::Client, &contract, ContractAction::Complete));
    }

    #[test]
    fn test_terminal_contracts_offer_no_transition() {
        for status in ContractStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for role in [Role::Client, Role::ServiceProvider, Role::Admin] {
                let actions = available_actions(role, &contract_in(status, 3));
                assert!(actions.iter().all(|a| !a.is_transition()), "{:?} {:?}", role, status);
                assert!(!actions.contains(&ContractAction::Pay));
            }
        }
    }

    #[test]
    fn test_provider_actions() {
        let pending = contract_in(ContractStatus::PendingProviderApproval, 2);
        assert_eq!(
            available_actions(Role::ServiceProvider, &pending),
            vec![ContractAction::Accept, ContractAction::Reject, ContractAction::Cancel]
        );
        assert_eq!(
            available_actions(Role::Client, &pending),
            vec![ContractAction::Cancel]
        );
        assert!(available_actions(Role::Admin, &pending).is_empty());
    }

    #[test]
    fn test_offered_transitions_are_legal() {
        for status in ContractStatus::ALL {
            for role in [Role::Client, Role::ServiceProvider] {
                for action in available_actions(role, &contract_in(status, 2)) {
                    if let Some(transition) = action.transition() {
                        assert!(transition.permits(role));
                        assert!(status.apply(transition).is_ok());
                    }
                }
            }
        }
    }

    #[test]
    fn test_status_styles_per_role() {
        let awaiting = ContractStatus::AwaitingClientConfirmation;
        assert_eq!(status_style(Role::Client, awaiting).color, "#8B5CF6");
        assert_eq!(status_style(Role::ServiceProvider, awaiting).color, "#3B82F6");
        assert_eq!(status_style(Role::Admin, awaiting).background, Some("#E0E7FF"));
        assert_eq!(status_style(Role::Client, ContractStatus::Active).label, "Active");
        for status in ContractStatus::ALL {
            assert_ne!(status_style(Role::Admin, status), FALLBACK);
        }
    }
}
