//! Platform fee and revenue split
//!
//! Every payment is split between the provider and the platform. The fee is a
//! configured percentage of the amount, rounded to two decimal places with
//! banker's rounding; the provider receives the remainder so the two parts
//! always add back up to the amount paid.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

/// Decimal places money is rounded to
const MONEY_SCALE: u32 = 2;

/// How a payment amount is divided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevenueSplit {
    /// Share passed on to the provider
    pub provider_amount: Decimal,
    /// Share kept by the platform
    pub platform_fee: Decimal,
}

/// Percentage fee charged by the platform
#[derive(Debug, Clone, Copy)]
pub struct FeePolicy {
    percent: Decimal,
}

impl FeePolicy {
    /// Create a policy charging `percent` of each payment
    pub fn new(percent: Decimal) -> Self {
        Self { percent }
    }

    /// The configured percentage
    pub fn percent(&self) -> Decimal {
        self.percent
    }

    /// Split `amount` into provider and platform shares
    pub fn split(&self, amount: Decimal) -> RevenueSplit {
        let platform_fee = (amount * self.percent / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven);
        let provider_amount = amount - platform_fee;

        debug!(
            "Revenue split: amount={}, fee={} ({}%), provider={}",
            amount, platform_fee, self.percent, provider_amount
        );

        RevenueSplit {
            provider_amount,
            platform_fee,
        }
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self::new(Decimal::TEN)
    }
}

/// Transaction reference of the form `PREFIX-YYYYMMDD-XXXXXXXX`
pub fn transaction_id(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("{}-{}-{}", prefix, at.format("%Y%m%d"), suffix)
}
