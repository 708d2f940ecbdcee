//! Contract, payment schedule and payment queries
//!
//! Status changes are compare-and-set on the status the caller last read, so
//! two actors racing on one contract produce a single winner.

use super::models::parse_column;
use super::Database;
use crate::domain::{
    Contract, ContractStatus, Payment, PaymentScheduleItem, ScheduleStatus, Signature,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};

/// Change to a listing's free slots that accompanies a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChange {
    /// Leave the listing untouched
    None,
    /// Take one slot; fails if none are left
    Reserve,
    /// Give one slot back, never above capacity
    Release,
}

/// Result of a compare-and-set write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied
    Applied,
    /// The contract no longer exists
    Missing,
    /// The contract was not in the expected status; carries the current one
    StatusChanged(ContractStatus),
    /// The listing had no free slot to reserve
    NoSlots,
    /// The targeted installment is no longer pending
    InstallmentSettled,
}

const CONTRACT_COLUMNS: &str = "c.id, c.service_id, c.client_id, c.provider_id, c.status, \
    c.start_date, c.end_date, c.duration_months, c.monthly_amount, c.total_amount, c.currency, \
    c.client_signed, c.client_signed_at, c.provider_signed, c.provider_signed_at, c.terms, \
    c.created_at, c.updated_at, cu.full_name, pu.full_name, s.title";

const CONTRACT_JOINS: &str = "contracts c \
    LEFT JOIN users cu ON cu.id = c.client_id \
    LEFT JOIN users pu ON pu.id = c.provider_id \
    LEFT JOIN services s ON s.id = c.service_id";

fn contract_from_row(row: &Row<'_>) -> rusqlite::Result<Contract> {
    Ok(Contract {
        id: row.get(0)?,
        service_id: row.get(1)?,
        client_id: row.get(2)?,
        provider_id: row.get(3)?,
        status: parse_column(row, 4)?,
        start_date: row.get(5)?,
        end_date: row.get(6)?,
        duration_months: row.get(7)?,
        monthly_amount: parse_column(row, 8)?,
        total_amount: parse_column(row, 9)?,
        currency: row.get(10)?,
        client_signature: Signature {
            signed: row.get::<_, i32>(11)? != 0,
            signed_at: row.get(12)?,
        },
        provider_signature: Signature {
            signed: row.get::<_, i32>(13)? != 0,
            signed_at: row.get(14)?,
        },
        payment_schedule: Vec::new(),
        auto_generated_terms: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
        client_name: row.get(18)?,
        provider_name: row.get(19)?,
        service_title: row.get(20)?,
    })
}

fn schedule_item_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentScheduleItem> {
    Ok(PaymentScheduleItem {
        due_date: row.get(0)?,
        amount: parse_column(row, 1)?,
        status: parse_column(row, 2)?,
        paid_at: row.get(3)?,
        transaction_id: row.get(4)?,
    })
}

fn load_schedule(conn: &Connection, contract_id: &str) -> rusqlite::Result<Vec<PaymentScheduleItem>> {
    let mut stmt = conn.prepare(
        "SELECT due_date, amount, status, paid_at, transaction_id FROM payment_schedule \
         WHERE contract_id = ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map([contract_id], schedule_item_from_row)?;
    rows.collect()
}

fn current_status(conn: &Connection, contract_id: &str) -> rusqlite::Result<Option<ContractStatus>> {
    conn.query_row(
        "SELECT status FROM contracts WHERE id = ?1",
        [contract_id],
        |row| parse_column(row, 0),
    )
    .optional()
}

/// Contract queries
pub struct ContractQueries<'a> {
    db: &'a Database,
}

impl<'a> ContractQueries<'a> {
    /// Create a new query instance
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a contract with its payment schedule
    pub async fn insert(&self, contract: &Contract) -> Result<()> {
        let conn = self.db.conn();
        let mut conn = conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO contracts (id, service_id, client_id, provider_id, status, start_date, end_date,
                                   duration_months, monthly_amount, total_amount, currency,
                                   client_signed, client_signed_at, provider_signed, provider_signed_at,
                                   terms, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            rusqlite::params![
                &contract.id,
                &contract.service_id,
                &contract.client_id,
                &contract.provider_id,
                contract.status.as_str(),
                contract.start_date,
                contract.end_date,
                contract.duration_months,
                contract.monthly_amount.to_string(),
                contract.total_amount.to_string(),
                &contract.currency,
                contract.client_signature.signed,
                contract.client_signature.signed_at,
                contract.provider_signature.signed,
                contract.provider_signature.signed_at,
                &contract.auto_generated_terms,
                contract.created_at,
                contract.updated_at,
            ],
        )?;

        for (seq, item) in contract.payment_schedule.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO payment_schedule (contract_id, seq, due_date, amount, status, paid_at, transaction_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                rusqlite::params![
                    &contract.id,
                    seq as i64,
                    item.due_date,
                    item.amount.to_string(),
                    item.status.as_str(),
                    item.paid_at,
                    item.transaction_id.as_deref(),
                ],
            )?;
        }

        tx.commit()?;
        info!(
            "DB: Inserted contract: id={}, service_id={}, status={}, months={}, total={}",
            contract.id, contract.service_id, contract.status, contract.duration_months, contract.total_amount
        );
        Ok(())
    }

    /// Get a contract with its schedule by ID
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Contract>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let contract = conn
            .query_row(
                &format!("SELECT {} FROM {} WHERE c.id = ?1", CONTRACT_COLUMNS, CONTRACT_JOINS),
                [id],
                contract_from_row,
            )
            .optional()?;

        match contract {
            Some(mut contract) => {
                contract.payment_schedule = load_schedule(&conn, &contract.id)?;
                Ok(Some(contract))
            }
            None => Ok(None),
        }
    }

    /// Contracts where the user is the client
    pub async fn list_for_client(&self, client_id: &str) -> Result<Vec<Contract>> {
        self.list_where("c.client_id = ?1", Some(client_id)).await
    }

    /// Contracts where the user is the provider
    pub async fn list_for_provider(&self, provider_id: &str) -> Result<Vec<Contract>> {
        self.list_where("c.provider_id = ?1", Some(provider_id)).await
    }

    /// Contracts against one listing
    pub async fn list_for_service(&self, service_id: &str) -> Result<Vec<Contract>> {
        self.list_where("c.service_id = ?1", Some(service_id)).await
    }

    /// Every contract
    pub async fn list_all(&self) -> Result<Vec<Contract>> {
        self.list_where("1 = 1", None).await
    }

    async fn list_where(&self, clause: &str, arg: Option<&str>) -> Result<Vec<Contract>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE {} ORDER BY c.created_at DESC",
            CONTRACT_COLUMNS, CONTRACT_JOINS, clause
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(arg.iter()), contract_from_row)?;

        let mut contracts = Vec::new();
        for row in rows {
            let mut contract = row?;
            contract.payment_schedule = load_schedule(&conn, &contract.id)?;
            contracts.push(contract);
        }
        debug!("DB: Listed {} contracts where {}", contracts.len(), clause);
        Ok(contracts)
    }

    /// Write `contract`'s new status and signatures if it is still in `expected`
    pub async fn compare_and_set(
        &self,
        contract: &Contract,
        expected: ContractStatus,
        slots: SlotChange,
    ) -> Result<WriteOutcome> {
        let conn = self.db.conn();
        let mut conn = conn.lock().await;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            r#"
            UPDATE contracts
            SET status = ?1, client_signed = ?2, client_signed_at = ?3,
                provider_signed = ?4, provider_signed_at = ?5, updated_at = ?6
            WHERE id = ?7 AND status = ?8
            "#,
            rusqlite::params![
                contract.status.as_str(),
                contract.client_signature.signed,
                contract.client_signature.signed_at,
                contract.provider_signature.signed,
                contract.provider_signature.signed_at,
                contract.updated_at,
                &contract.id,
                expected.as_str(),
            ],
        )?;

        if updated == 0 {
            let outcome = match current_status(&tx, &contract.id)? {
                Some(status) => WriteOutcome::StatusChanged(status),
                None => WriteOutcome::Missing,
            };
            debug!("DB: Contract {} transition not applied: {:?}", contract.id, outcome);
            return Ok(outcome);
        }

        match slots {
            SlotChange::None => {}
            SlotChange::Reserve => {
                let reserved = tx.execute(
                    "UPDATE services SET available_slots = available_slots - 1 \
                     WHERE id = ?1 AND available_slots > 0",
                    [&contract.service_id],
                )?;
                if reserved == 0 {
                    // dropping the transaction rolls the status change back
                    return Ok(WriteOutcome::NoSlots);
                }
            }
            SlotChange::Release => {
                tx.execute(
                    "UPDATE services SET available_slots = MIN(capacity, available_slots + 1) \
                     WHERE id = ?1",
                    [&contract.service_id],
                )?;
            }
        }

        tx.commit()?;
        info!(
            "DB: Contract status changed: id={}, {} -> {}, slots={:?}",
            contract.id, expected, contract.status, slots
        );
        Ok(WriteOutcome::Applied)
    }
}

const PAYMENT_COLUMNS: &str = "id, contract_id, client_id, provider_id, amount, currency, status, \
    payment_method, transaction_id, provider_amount, platform_fee, installment, payment_date";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        contract_id: row.get(1)?,
        client_id: row.get(2)?,
        provider_id: row.get(3)?,
        amount: parse_column(row, 4)?,
        currency: row.get(5)?,
        status: parse_column(row, 6)?,
        payment_method: row.get(7)?,
        transaction_id: row.get(8)?,
        provider_amount: parse_column(row, 9)?,
        platform_fee: parse_column(row, 10)?,
        installment: row.get(11)?,
        payment_date: row.get(12)?,
    })
}

/// Payment queries
pub struct PaymentQueries<'a> {
    db: &'a Database,
}

impl<'a> PaymentQueries<'a> {
    /// Create a new query instance
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Record `payment` and mark its installment paid
    ///
    /// Applied only while the contract is active and the installment pending.
    pub async fn record(&self, payment: &Payment, paid_at: DateTime<Utc>) -> Result<WriteOutcome> {
        let conn = self.db.conn();
        let mut conn = conn.lock().await;
        let tx = conn.transaction()?;

        match current_status(&tx, &payment.contract_id)? {
            None => return Ok(WriteOutcome::Missing),
            Some(ContractStatus::Active) => {}
            Some(status) => return Ok(WriteOutcome::StatusChanged(status)),
        }

        let settled = tx.execute(
            r#"
            UPDATE payment_schedule
            SET status = ?1, paid_at = ?2, transaction_id = ?3
            WHERE contract_id = ?4 AND seq = ?5 AND status = ?6
            "#,
            rusqlite::params![
                ScheduleStatus::Paid.as_str(),
                paid_at,
                &payment.transaction_id,
                &payment.contract_id,
                payment.installment,
                ScheduleStatus::Pending.as_str(),
            ],
        )?;
        if settled == 0 {
            return Ok(WriteOutcome::InstallmentSettled);
        }

        tx.execute(
            &format!(
                "INSERT INTO payments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                PAYMENT_COLUMNS
            ),
            rusqlite::params![
                &payment.id,
                &payment.contract_id,
                &payment.client_id,
                &payment.provider_id,
                payment.amount.to_string(),
                &payment.currency,
                payment.status.as_str(),
                &payment.payment_method,
                &payment.transaction_id,
                payment.provider_amount.to_string(),
                payment.platform_fee.to_string(),
                payment.installment,
                payment.payment_date,
            ],
        )?;

        tx.execute(
            "UPDATE contracts SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![paid_at, &payment.contract_id],
        )?;

        tx.commit()?;
        info!(
            "DB: Recorded payment: id={}, contract_id={}, installment={}, amount={}, fee={}, txn={}",
            payment.id,
            payment.contract_id,
            payment.installment,
            payment.amount,
            payment.platform_fee,
            payment.transaction_id
        );
        Ok(WriteOutcome::Applied)
    }

    /// Payments of a contract, oldest first
    pub async fn list_for_contract(&self, contract_id: &str) -> Result<Vec<Payment>> {
        self.list_where("contract_id = ?1 ORDER BY installment", contract_id)
            .await
    }

    /// Payments received by a provider, newest first
    pub async fn list_for_provider(&self, provider_id: &str) -> Result<Vec<Payment>> {
        self.list_where("provider_id = ?1 ORDER BY payment_date DESC", provider_id)
            .await
    }

    async fn list_where(&self, clause: &str, arg: &str) -> Result<Vec<Payment>> {
        let conn = self.db.conn();
        let conn = conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM payments WHERE {}",
            PAYMENT_COLUMNS, clause
        ))?;
        let rows = stmt.query_map([arg], payment_from_row)?;

        let mut payments = Vec::new();
        for row in rows {
            payments.push(row?);
        }
        Ok(payments)
    }
}
