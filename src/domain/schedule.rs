//! Monthly payment schedule

use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of one installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Not paid yet
    Pending,
    /// Paid in full
    Paid,
    /// Stored and displayed, never assigned automatically
    Overdue,
}

impl ScheduleStatus {
    /// Wire and storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Paid => "paid",
            ScheduleStatus::Overdue => "overdue",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "paid" => Ok(ScheduleStatus::Paid),
            "overdue" => Ok(ScheduleStatus::Overdue),
            other => Err(format!("unknown schedule status: {}", other)),
        }
    }
}

/// One monthly installment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentScheduleItem {
    /// Due date
    pub due_date: NaiveDate,
    /// Amount
    pub amount: Decimal,
    /// Status
    pub status: ScheduleStatus,
    /// When it was paid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    /// Payment that discharged it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl PaymentScheduleItem {
    /// Unpaid installment
    pub fn pending(due_date: NaiveDate, amount: Decimal) -> Self {
        Self {
            due_date,
            amount,
            status: ScheduleStatus::Pending,
            paid_at: None,
            transaction_id: None,
        }
    }

    /// Whether the installment still awaits payment
    pub fn is_pending(&self) -> bool {
        self.status == ScheduleStatus::Pending
    }
}

/// One installment per month; item `i` falls due `i` months after `start`
///
/// Returns `None` when a due date overflows the calendar.
pub fn generate(
    start: NaiveDate,
    duration_months: u32,
    monthly_amount: Decimal,
) -> Option<Vec<PaymentScheduleItem>> {
    (0..duration_months)
        .map(|i| {
            start
                .checked_add_months(Months::new(i))
                .map(|due| PaymentScheduleItem::pending(due, monthly_amount))
        })
        .collect()
}

/// Index of the first pending installment in document order
pub fn next_payable(items: &[PaymentScheduleItem]) -> Option<usize> {
    items.iter().position(PaymentScheduleItem::is_pending)
}

/// Record payment of the installment at `index`
pub fn mark_paid(
    items: &mut [PaymentScheduleItem],
    index: usize,
    paid_at: DateTime<Utc>,
    transaction_id: &str,
) -> bool {
    match items.get_mut(index) {
        Some(item) if item.is_pending() => {
            item.status = ScheduleStatus::Paid;
            item.paid_at = Some(paid_at);
            item.transaction_id = Some(transaction_id.to_string());
            true
        }
        _ => false,
    }
}

/// Installments already paid
pub fn paid_count(items: &[PaymentScheduleItem]) -> usize {
    items
        .iter()
        .filter(|item| item.status == ScheduleStatus::Paid)
        .count()
}

/// Sum of every installment
pub fn total(items: &[PaymentScheduleItem]) -> Decimal {
    items.iter().map(|item| item.amount).sum()
}

/// Sum of installments not yet paid
pub fn outstanding(items: &[PaymentScheduleItem]) -> Decimal {
    items
        .iter()
        .filter(|item| item.status != ScheduleStatus::Paid)
        .map(|item| item.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_generate_monthly_due_dates() {
        let items = generate(date(2025, 9, 1), 3, Decimal::from(100)).unwrap();
        let due: Vec<NaiveDate> = items.iter().map(|i| i.due_date).collect();
        assert_eq!(due, vec![date(2025, 9, 1), date(2025, 10, 1), date(2025, 11, 1)]);
        assert!(items.iter().all(|i| i.is_pending()));
        assert_eq!(total(&items), Decimal::from(300));
    }

    #[test]
    fn test_generate_clamps_month_end() {
        let items = generate(date(2024, 1, 31), 2, Decimal::from(10)).unwrap();
        assert_eq!(items[1].due_date, date(2024, 2, 29));
    }

    #[test]
    fn test_next_payable_is_fifo() {
        let mut items = generate(date(2025, 1, 1), 3, Decimal::from(50)).unwrap();
        assert_eq!(next_payable(&items), Some(0));

        assert!(mark_paid(&mut items, 0, Utc::now(), "TX-1"));
        assert_eq!(next_payable(&items), Some(1));
        assert_eq!(paid_count(&items), 1);
        assert_eq!(outstanding(&items), Decimal::from(100));

        // an overdue item is not payable through the FIFO cursor
        items[1].status = ScheduleStatus::Overdue;
        assert_eq!(next_payable(&items), Some(2));
    }

    #[test]
    fn test_mark_paid_is_one_shot() {
        let mut items = generate(date(2025, 1, 1), 1, Decimal::from(50)).unwrap();
        assert!(mark_paid(&mut items, 0, Utc::now(), "TX-1"));
        assert!(!mark_paid(&mut items, 0, Utc::now(), "TX-2"));
        assert_eq!(items[0].transaction_id.as_deref(), Some("TX-1"));
        assert!(!mark_paid(&mut items, 5, Utc::now(), "TX-3"));
        assert_eq!(next_payable(&items), None);
    }
}
