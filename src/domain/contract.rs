//! Contract entity and its status state machine
//!
//! A contract binds a client, a provider and a listing over a range of whole
//! months. Its status only ever moves along the edges accepted by
//! [`ContractStatus::apply`]; completed, cancelled and rejected are terminal.

use super::account::Role;
use super::schedule::{self, PaymentScheduleItem};
use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Built but not yet submitted to the provider
    Draft,
    /// Waiting for the provider to accept or reject
    PendingProviderApproval,
    /// Provider accepted, waiting for the client to confirm
    #[serde(alias = "awaiting_student_confirmation")]
    AwaitingClientConfirmation,
    /// Confirmed by both parties, payments are due
    Active,
    /// Marked complete by the client
    Completed,
    /// Cancelled by either party
    Cancelled,
    /// Rejected by the provider
    Rejected,
}

impl ContractStatus {
    /// Every status, in lifecycle order
    pub const ALL: [ContractStatus; 7] = [
        ContractStatus::Draft,
        ContractStatus::PendingProviderApproval,
        ContractStatus::AwaitingClientConfirmation,
        ContractStatus::Active,
        ContractStatus::Completed,
        ContractStatus::Cancelled,
        ContractStatus::Rejected,
    ];

    /// Wire and storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::PendingProviderApproval => "pending_provider_approval",
            ContractStatus::AwaitingClientConfirmation => "awaiting_client_confirmation",
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Cancelled => "cancelled",
            ContractStatus::Rejected => "rejected",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContractStatus::Completed | ContractStatus::Cancelled | ContractStatus::Rejected
        )
    }

    /// Compute the status reached by applying `transition`
    pub fn apply(self, transition: Transition) -> Result<ContractStatus, TransitionError> {
        use ContractStatus::*;

        let next = match (self, transition) {
            (Draft, Transition::Submit) => PendingProviderApproval,
            (PendingProviderApproval, Transition::ProviderAccept) => AwaitingClientConfirmation,
            (PendingProviderApproval, Transition::ProviderReject) => Rejected,
            (AwaitingClientConfirmation, Transition::ClientConfirm) => Active,
            (Active, Transition::Complete) => Completed,
            (status, Transition::Cancel) if !status.is_terminal() => Cancelled,
            (from, transition) => return Err(TransitionError::NotAllowed { from, transition }),
        };

        Ok(next)
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ContractStatus::Draft),
            "pending_provider_approval" => Ok(ContractStatus::PendingProviderApproval),
            "awaiting_client_confirmation" | "awaiting_student_confirmation" => {
                Ok(ContractStatus::AwaitingClientConfirmation)
            }
            "active" => Ok(ContractStatus::Active),
            "completed" => Ok(ContractStatus::Completed),
            "cancelled" => Ok(ContractStatus::Cancelled),
            "rejected" => Ok(ContractStatus::Rejected),
            other => Err(format!("unknown contract status: {}", other)),
        }
    }
}

/// A command that moves a contract between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Client submits a draft to the provider
    Submit,
    /// Provider accepts a pending request
    ProviderAccept,
    /// Provider rejects a pending request
    ProviderReject,
    /// Client confirms an accepted contract
    ClientConfirm,
    /// Client marks an active contract as done
    Complete,
    /// Either party cancels
    Cancel,
}

impl Transition {
    /// Roles allowed to issue this transition
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Transition::Submit | Transition::ClientConfirm | Transition::Complete => &[Role::Client],
            Transition::ProviderAccept | Transition::ProviderReject => &[Role::ServiceProvider],
            Transition::Cancel => &[Role::Client, Role::ServiceProvider],
        }
    }

    /// Whether `role` may issue this transition
    pub fn permits(&self, role: Role) -> bool {
        self.allowed_roles().contains(&role)
    }

    /// Verb used in messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Submit => "submit",
            Transition::ProviderAccept => "accept",
            Transition::ProviderReject => "reject",
            Transition::ClientConfirm => "confirm",
            Transition::Complete => "complete",
            Transition::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected transition
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The current status has no edge for this transition
    #[error("cannot {transition} a contract that is {from}")]
    NotAllowed {
        /// Status the contract was in
        from: ContractStatus,
        /// Transition that was attempted
        transition: Transition,
    },

    /// The caller's role may not issue this transition
    #[error("a {role} cannot {transition} a contract")]
    WrongRole {
        /// Role of the caller
        role: Role,
        /// Transition that was attempted
        transition: Transition,
    },
}

/// Signature of one party
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Whether the party has signed
    pub signed: bool,
    /// When the party signed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
}

impl Signature {
    /// A signature made at `at`
    pub fn signed_at(at: DateTime<Utc>) -> Self {
        Self {
            signed: true,
            signed_at: Some(at),
        }
    }

    /// Sign once; an existing signature keeps its original timestamp
    pub fn sign(&mut self, at: DateTime<Utc>) {
        if !self.signed {
            *self = Self::signed_at(at);
        }
    }
}

/// A contract as exchanged between backend and clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Contract ID
    pub id: String,
    /// Listing the contract books
    pub service_id: String,
    /// Client party
    pub client_id: String,
    /// Provider party
    pub provider_id: String,
    /// Status
    pub status: ContractStatus,
    /// First day of service
    pub start_date: NaiveDate,
    /// Last day of service
    pub end_date: NaiveDate,
    /// Length in months, at least one
    pub duration_months: u32,
    /// Price per month
    pub monthly_amount: Decimal,
    /// `monthly_amount` times `duration_months`
    pub total_amount: Decimal,
    /// Currency code
    pub currency: String,
    /// Client signature
    pub client_signature: Signature,
    /// Provider signature
    pub provider_signature: Signature,
    /// One installment per month, in due-date order
    pub payment_schedule: Vec<PaymentScheduleItem>,
    /// Rendered verbatim, never parsed
    pub auto_generated_terms: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
    /// Client display name, filled on read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Provider display name, filled on read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    /// Listing title, filled on read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_title: Option<String>,
}

impl Contract {
    /// Index and item of the earliest pending installment
    pub fn next_payable(&self) -> Option<(usize, &PaymentScheduleItem)> {
        schedule::next_payable(&self.payment_schedule).map(|i| (i, &self.payment_schedule[i]))
    }

    /// Number of installments already paid
    pub fn paid_installments(&self) -> usize {
        schedule::paid_count(&self.payment_schedule)
    }

    /// Role `user_id` plays in this contract, if any
    pub fn party_role(&self, user_id: &str) -> Option<Role> {
        if self.client_id == user_id {
            Some(Role::Client)
        } else if self.provider_id == user_id {
            Some(Role::ServiceProvider)
        } else {
            None
        }
    }

    /// Apply a transition issued by `role`, including signature side effects
    ///
    /// Returns the status the contract was in before the transition.
    pub fn transition(
        &mut self,
        transition: Transition,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<ContractStatus, TransitionError> {
        if !transition.permits(role) {
            return Err(TransitionError::WrongRole { role, transition });
        }

        let previous = self.status;
        self.status = previous.apply(transition)?;

        match transition {
            Transition::ProviderAccept => self.provider_signature.sign(now),
            Transition::ClientConfirm => self.client_signature.sign(now),
            _ => {}
        }
        self.updated_at = now;

        Ok(previous)
    }

    /// Check the amount and schedule invariants
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let expected_total = total_for(self.monthly_amount, self.duration_months);
        if self.total_amount != expected_total {
            return Err(InvariantViolation::Total {
                expected: expected_total,
                actual: self.total_amount,
            });
        }

        if self.payment_schedule.len() != self.duration_months as usize {
            return Err(InvariantViolation::ScheduleLength {
                expected: self.duration_months as usize,
                actual: self.payment_schedule.len(),
            });
        }

        let scheduled = schedule::total(&self.payment_schedule);
        if scheduled != self.total_amount {
            return Err(InvariantViolation::ScheduleSum {
                expected: self.total_amount,
                actual: scheduled,
            });
        }

        Ok(())
    }
}

/// Total owed over the whole contract
pub fn total_for(monthly_amount: Decimal, duration_months: u32) -> Decimal {
    monthly_amount * Decimal::from(duration_months)
}

/// Broken contract invariant
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("total amount {actual} does not equal monthly amount times duration ({expected})")]
    Total {
        /// Value the invariant requires
        expected: Decimal,
        /// Value found on the contract
        actual: Decimal,
    },

    #[error("payment schedule has {actual} items, expected {expected}")]
    ScheduleLength {
        /// Value the invariant requires
        expected: usize,
        /// Value found on the contract
        actual: usize,
    },

    #[error("payment schedule sums to {actual}, expected {expected}")]
    ScheduleSum {
        /// Value the invariant requires
        expected: Decimal,
        /// Value found on the contract
        actual: Decimal,
    },
}

/// Contract request sent by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContract {
    /// Listing to book
    pub service_id: String,
    /// First day of service
    pub start_date: NaiveDate,
    /// Length in months
    pub duration_months: u32,
}

/// Inputs for a new contract
#[derive(Debug, Clone)]
pub struct ContractDraft {
    /// Service id
    pub service_id: String,
    /// Client id
    pub client_id: String,
    /// Provider id
    pub provider_id: String,
    /// Start date
    pub start_date: NaiveDate,
    /// Length in months
    pub duration_months: u32,
    /// Listing price at request time
    pub monthly_amount: Decimal,
    /// Currency code
    pub currency: String,
}

/// Reason a draft cannot become a contract
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    /// Duration of zero months
    #[error("duration must be at least one month")]
    ZeroDuration,

    /// Monthly amount is zero or negative
    #[error("monthly amount must be positive")]
    NonPositiveAmount,

    /// End date cannot be represented
    #[error("contract end date is out of range")]
    DateOutOfRange,
}

impl ContractDraft {
    /// Build a draft-status contract with its end date, total and schedule
    pub fn build(
        self,
        id: String,
        terms: String,
        now: DateTime<Utc>,
    ) -> Result<Contract, DraftError> {
        if self.duration_months == 0 {
            return Err(DraftError::ZeroDuration);
        }
        if self.monthly_amount <= Decimal::ZERO {
            return Err(DraftError::NonPositiveAmount);
        }

        let end_date = self.end_date()?;
        let payment_schedule =
            schedule::generate(self.start_date, self.duration_months, self.monthly_amount)
                .ok_or(DraftError::DateOutOfRange)?;

        Ok(Contract {
            id,
            service_id: self.service_id,
            client_id: self.client_id,
            provider_id: self.provider_id,
            status: ContractStatus::Draft,
            start_date: self.start_date,
            end_date,
            duration_months: self.duration_months,
            monthly_amount: self.monthly_amount,
            total_amount: total_for(self.monthly_amount, self.duration_months),
            currency: self.currency,
            client_signature: Signature::default(),
            provider_signature: Signature::default(),
            payment_schedule,
            auto_generated_terms: terms,
            created_at: now,
            updated_at: now,
            client_name: None,
            provider_name: None,
            service_title: None,
        })
    }

    /// Start date plus the duration in calendar months
    pub fn end_date(&self) -> Result<NaiveDate, DraftError> {
        self.start_date
            .checked_add_months(Months::new(self.duration_months))
            .ok_or(DraftError::DateOutOfRange)
    }
}
