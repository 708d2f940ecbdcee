//! Committed payments and provider earnings

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Settlement state of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Not settled yet
    Pending,
    /// Settled
    Completed,
    /// Refused by the processor
    Failed,
    /// Returned to the client
    Refunded,
}

impl PaymentStatus {
    /// Wire and storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" | "paid" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// A payment recorded against a contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment ID
    pub id: String,
    /// Contract id
    pub contract_id: String,
    /// Client id
    pub client_id: String,
    /// Provider id
    pub provider_id: String,
    /// Amount charged
    pub amount: Decimal,
    /// Currency code
    pub currency: String,
    /// Status
    pub status: PaymentStatus,
    /// Processor the client chose
    pub payment_method: String,
    /// Processor reference
    pub transaction_id: String,
    /// Share paid out to the provider
    pub provider_amount: Decimal,
    /// Share kept by the platform
    pub platform_fee: Decimal,
    /// Position of the discharged installment in the schedule
    pub installment: u32,
    /// Settlement time
    pub payment_date: DateTime<Utc>,
}

impl Payment {
    /// The split adds back up to the amount paid
    pub fn is_balanced(&self) -> bool {
        self.provider_amount + self.platform_fee == self.amount
    }
}

/// Payment request sent by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Contract to pay
    pub contract_id: String,
    /// Must equal the next installment
    pub amount: Decimal,
    /// Processor to charge
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

pub(crate) fn default_payment_method() -> String {
    "mock_card".to_string()
}

/// Totals over a provider's completed payments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEarnings {
    /// Currency code
    pub currency: String,
    /// Sum of amounts charged
    pub total_gross: Decimal,
    /// Sum of platform shares
    pub total_platform_fees: Decimal,
    /// Sum of provider shares
    pub total_earnings: Decimal,
    /// Completed payments counted
    pub total_transactions: u32,
    /// Newest payments first
    pub recent_payments: Vec<Payment>,
}

impl ProviderEarnings {
    /// Summarise `payments`, newest first, keeping `recent` of them
    pub fn summarise(currency: &str, mut payments: Vec<Payment>, recent: usize) -> Self {
        payments.retain(|p| p.status == PaymentStatus::Completed);
        payments.sort_by(|a, b| b.payment_date.cmp(&a.payment_date));

        let total_gross = payments.iter().map(|p| p.amount).sum();
        let total_platform_fees = payments.iter().map(|p| p.platform_fee).sum();
        let total_earnings = payments.iter().map(|p| p.provider_amount).sum();
        let total_transactions = payments.len() as u32;
        payments.truncate(recent);

        Self {
            currency: currency.to_string(),
            total_gross,
            total_platform_fees,
            total_earnings,
            total_transactions,
            recent_payments: payments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(amount: i64, fee: i64, minutes_ago: i64) -> Payment {
        Payment {
            id: uuid::Uuid::new_v4().to_string(),
            contract_id: "c".to_string(),
            client_id: "client".to_string(),
            provider_id: "provider".to_string(),
            amount: Decimal::from(amount),
            currency: "OMR".to_string(),
            status: PaymentStatus::Completed,
            payment_method: default_payment_method(),
            transaction_id: "TX".to_string(),
            provider_amount: Decimal::from(amount - fee),
            platform_fee: Decimal::from(fee),
            installment: 0,
            payment_date: Utc::now() - chrono::Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_earnings_summary() {
        let mut refunded = payment(500, 50, 0);
        refunded.status = PaymentStatus::Refunded;
        let payments = vec![payment(100, 10, 30), payment(200, 20, 10), refunded];

        let earnings = ProviderEarnings::summarise("OMR", payments, 1);
        assert_eq!(earnings.total_gross, Decimal::from(300));
        assert_eq!(earnings.total_platform_fees, Decimal::from(30));
        assert_eq!(earnings.total_earnings, Decimal::from(270));
        assert_eq!(earnings.total_transactions, 2);
        assert_eq!(earnings.recent_payments.len(), 1);
        assert_eq!(earnings.recent_payments[0].amount, Decimal::from(200));
    }
}
