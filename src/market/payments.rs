//! Installment payments and provider earnings

use super::{db_error, require_role, MarketService};
use crate::{
    db::{PaymentQueries, WriteOutcome},
    domain::{
        ContractStatus, Payment, PaymentRequest, PaymentStatus, ProviderEarnings, Role, User,
    },
    fee, MarketError, MarketResult,
};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

impl MarketService {
    /// Pay the earliest pending installment of an active contract
    pub async fn make_payment(&self, caller: &User, req: PaymentRequest) -> MarketResult<Payment> {
        info!(
            "Payment requested: contract_id={}, amount={}, method={}",
            req.contract_id, req.amount, req.payment_method
        );

        require_role(caller, Role::Client)?;
        if req.amount <= Decimal::ZERO {
            return Err(MarketError::Validation(
                "Payment amount must be greater than zero".to_string(),
            ));
        }

        let contract = self.load_contract(&req.contract_id).await?;
        if contract.client_id != caller.id {
            return Err(MarketError::Forbidden(
                "Not authorized to pay for this contract".to_string(),
            ));
        }
        if contract.status != ContractStatus::Active {
            return Err(MarketError::Validation(format!(
                "Contract must be active to make a payment, it is {}",
                contract.status
            )));
        }

        let (installment, item) = contract.next_payable().ok_or_else(|| {
            MarketError::Validation("All installments are already paid".to_string())
        })?;
        if self.config.marketplace.enforce_payment_order && req.amount != item.amount {
            return Err(MarketError::Validation(format!(
                "Payment must match the next installment of {} {} due {}",
                item.amount, contract.currency, item.due_date
            )));
        }

        let now = Utc::now();
        let split = self.fees.split(req.amount);
        let payment = Payment {
            id: uuid::Uuid::new_v4().to_string(),
            contract_id: contract.id.clone(),
            client_id: contract.client_id.clone(),
            provider_id: contract.provider_id.clone(),
            amount: req.amount,
            currency: contract.currency.clone(),
            status: PaymentStatus::Completed,
            payment_method: req.payment_method,
            transaction_id: fee::transaction_id(&self.config.marketplace.transaction_prefix, now),
            provider_amount: split.provider_amount,
            platform_fee: split.platform_fee,
            installment: installment as u32,
            payment_date: now,
        };

        let outcome = PaymentQueries::new(&self.db)
            .record(&payment, now)
            .await
            .map_err(db_error("Failed to record payment"))?;

        match outcome {
            WriteOutcome::Applied => {
                info!(
                    "Payment completed: txn={}, contract_id={}, installment={}/{}, provider={}, fee={}",
                    payment.transaction_id,
                    payment.contract_id,
                    installment + 1,
                    contract.payment_schedule.len(),
                    payment.provider_amount,
                    payment.platform_fee
                );
                Ok(payment)
            }
            WriteOutcome::StatusChanged(status) => {
                warn!("Payment on {} refused: contract became {}", contract.id, status);
                Err(MarketError::Conflict(format!(
                    "Contract was modified concurrently and is now {}",
                    status
                )))
            }
            WriteOutcome::InstallmentSettled => {
                warn!(
                    "Payment on {} refused: installment {} already settled",
                    contract.id, installment
                );
                Err(MarketError::Conflict(
                    "This installment was already paid".to_string(),
                ))
            }
            WriteOutcome::Missing | WriteOutcome::NoSlots => {
                Err(MarketError::NotFound(format!("Contract {}", contract.id)))
            }
        }
    }

    /// Payments recorded against a contract
    pub async fn contract_payments(&self, caller: &User, contract_id: &str) -> MarketResult<Vec<Payment>> {
        self.get_contract(caller, contract_id).await?;
        PaymentQueries::new(&self.db)
            .list_for_contract(contract_id)
            .await
            .map_err(db_error("Failed to list payments"))
    }

    /// Gross, fee and net totals of a provider's received payments
    pub async fn provider_earnings(&self, caller: &User) -> MarketResult<ProviderEarnings> {
        require_role(caller, Role::ServiceProvider)?;
        let payments = PaymentQueries::new(&self.db)
            .list_for_provider(&caller.id)
            .await
            .map_err(db_error("Failed to list payments"))?;

        Ok(ProviderEarnings::summarise(
            &self.config.marketplace.currency,
            payments,
            self.config.marketplace.recent_payments,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{schedule::ScheduleStatus, Contract};
    use crate::market::tests::{fixture, request, Fixture};

    async fn active_contract(f: &Fixture, months: u32) -> Contract {
        let contract = f.market.create_contract(&f.client, request(&f.service, months)).await.unwrap();
        f.market.provider_accept(&f.provider, &contract.id).await.unwrap();
        f.market.client_confirm(&f.client, &contract.id).await.unwrap()
    }

    fn pay(contract: &Contract, amount: i64) -> PaymentRequest {
        PaymentRequest {
            contract_id: contract.id.clone(),
            amount: Decimal::from(amount),
            payment_method: "mock_card".to_string(),
        }
    }

    #[tokio::test]
    async fn test_payments_settle_in_order() {
        let f = fixture(2, false).await;
        let contract = active_contract(&f, 2).await;

        let first = f.market.make_payment(&f.client, pay(&contract, 100)).await.unwrap();
        assert_eq!(first.installment, 0);
        assert_eq!(first.platform_fee, Decimal::from(10));
        assert_eq!(first.provider_amount, Decimal::from(90));
        assert!(first.is_balanced());
        assert!(first.transaction_id.starts_with("MYS-"));

        let reloaded = f.market.get_contract(&f.client, &contract.id).await.unwrap();
        assert_eq!(reloaded.payment_schedule[0].status, ScheduleStatus::Paid);
        assert_eq!(
            reloaded.payment_schedule[0].transaction_id.as_deref(),
            Some(first.transaction_id.as_str())
        );
        assert_eq!(reloaded.payment_schedule[1].status, ScheduleStatus::Pending);

        let second = f.market.make_payment(&f.client, pay(&contract, 100)).await.unwrap();
        assert_eq!(second.installment, 1);

        let err = f.market.make_payment(&f.client, pay(&contract, 100)).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));

        let earnings = f.market.provider_earnings(&f.provider).await.unwrap();
        assert_eq!(earnings.total_gross, Decimal::from(200));
        assert_eq!(earnings.total_platform_fees, Decimal::from(20));
        assert_eq!(earnings.total_earnings, Decimal::from(180));
        assert_eq!(earnings.total_transactions, 2);
        assert_eq!(f.market.contract_payments(&f.provider, &contract.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_payment_requires_active_contract_and_exact_amount() {
        let f = fixture(2, false).await;
        let pending = f.market.create_contract(&f.client, request(&f.service, 2)).await.unwrap();
        let err = f.market.make_payment(&f.client, pay(&pending, 100)).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));

        let contract = active_contract(&f, 2).await;
        let err = f.market.make_payment(&f.client, pay(&contract, 50)).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
        let err = f.market.make_payment(&f.client, pay(&contract, 0)).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
        let err = f.market.make_payment(&f.provider, pay(&contract, 100)).await.unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_concurrent_payments_settle_each_installment_once() {
        let f = fixture(2, false).await;
        let contract = active_contract(&f, 3).await;

        let (a, b) = tokio::join!(
            f.market.make_payment(&f.client, pay(&contract, 100)),
            f.market.make_payment(&f.client, pay(&contract, 100)),
        );
        let paid: Vec<_> = [a, b].into_iter().filter_map(Result::ok).collect();
        assert!(!paid.is_empty());

        let reloaded = f.market.get_contract(&f.client, &contract.id).await.unwrap();
        assert_eq!(reloaded.paid_installments(), paid.len());
        let recorded = f.market.contract_payments(&f.client, &contract.id).await.unwrap();
        assert_eq!(recorded.len(), paid.len());
    }
}
