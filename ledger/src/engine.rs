//! Funds-movement transaction engine.

use std::sync::Arc;

use ledgerbank_common::{AccountNumber, Amount, AmountError, OperationId, MAX_BALANCE};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{AccountRole, LedgerError, LedgerResult};
use crate::metrics::EngineMetrics;
use crate::operation::{transfer_lock_order, Operation, OperationKind};
use crate::store::{AccountStore, StoreTransaction};

/// Post-operation state of a single-account movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceUpdate {
    pub account_number: AccountNumber,
    pub new_balance: Decimal,
}

/// Result of [`LedgerEngine::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Deposit or withdrawal committed.
    Balance(BalanceUpdate),
    /// Transfer committed.
    Transferred,
}

/// The ledger engine applies deposits, withdrawals and transfers.
///
/// Each call is one store transaction: rows are locked, balances re-read
/// under the lock, checked, written, and committed together. Any failure
/// rolls the transaction back before the error is returned.
pub struct LedgerEngine {
    store: Arc<dyn AccountStore>,
    metrics: Arc<EngineMetrics>,
}

impl LedgerEngine {
    /// Create an engine over the given store.
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self {
            store,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    /// Share an existing metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Add `amount` to an account.
    #[instrument(
        name = "deposit",
        skip_all,
        fields(operation_id = %OperationId::new(), account = %account_number, amount = %amount)
    )]
    pub async fn deposit(
        &self,
        account_number: &AccountNumber,
        amount: Decimal,
    ) -> LedgerResult<BalanceUpdate> {
        let amount = self.admit(&Operation::Deposit {
            account: account_number.clone(),
            amount,
        })?;

        let mut txn = self.begin().await?;
        let result = credit_account(txn.as_mut(), account_number, amount).await;
        self.settle(txn, OperationKind::Deposit, result).await
    }

    /// Take `amount` out of an account. Refused if the balance would go
    /// negative.
    #[instrument(
        name = "withdraw",
        skip_all,
        fields(operation_id = %OperationId::new(), account = %account_number, amount = %amount)
    )]
    pub async fn withdraw(
        &self,
        account_number: &AccountNumber,
        amount: Decimal,
    ) -> LedgerResult<BalanceUpdate> {
        let amount = self.admit(&Operation::Withdraw {
            account: account_number.clone(),
            amount,
        })?;

        let mut txn = self.begin().await?;
        let result = debit_account(txn.as_mut(), account_number, amount).await;
        self.settle(txn, OperationKind::Withdraw, result).await
    }

    /// Move `amount` from one account to another.
    ///
    /// Both rows are locked in ascending account-number order, whatever the
    /// direction of the transfer.
    #[instrument(
        name = "transfer",
        skip_all,
        fields(operation_id = %OperationId::new(), from = %from, to = %to, amount = %amount)
    )]
    pub async fn transfer(
        &self,
        from: &AccountNumber,
        to: &AccountNumber,
        amount: Decimal,
    ) -> LedgerResult<()> {
        let amount = self.admit(&Operation::Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
        })?;

        let mut txn = self.begin().await?;
        let result = move_funds(txn.as_mut(), from, to, amount).await;
        self.settle(txn, OperationKind::Transfer, result).await
    }

    /// Run a transient [`Operation`].
    pub async fn execute(&self, operation: Operation) -> LedgerResult<OperationOutcome> {
        match operation {
            Operation::Deposit { account, amount } => self
                .deposit(&account, amount)
                .await
                .map(OperationOutcome::Balance),
            Operation::Withdraw { account, amount } => self
                .withdraw(&account, amount)
                .await
                .map(OperationOutcome::Balance),
            Operation::Transfer { from, to, amount } => self
                .transfer(&from, &to, amount)
                .await
                .map(|()| OperationOutcome::Transferred),
        }
    }

    fn admit(&self, operation: &Operation) -> LedgerResult<Amount> {
        let amount = operation
            .validate()
            .map_err(|err| self.record_failure(err))?;
        self.metrics.operation_started();
        Ok(amount)
    }

    async fn begin(&self) -> LedgerResult<Box<dyn StoreTransaction>> {
        self.store
            .begin()
            .await
            .map_err(|err| self.record_failure(err.into()))
    }

    /// Commit on success, roll back on failure.
    async fn settle<T>(
        &self,
        txn: Box<dyn StoreTransaction>,
        kind: OperationKind,
        result: LedgerResult<T>,
    ) -> LedgerResult<T> {
        match result {
            Ok(value) => {
                if let Err(err) = txn.commit().await {
                    // A failed commit leaves nothing applied.
                    self.metrics.rollback();
                    return Err(self.record_failure(err.into()));
                }
                self.metrics.operation_committed(kind);
                info!(kind = %kind, "Operation committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "Rollback failed");
                }
                self.metrics.rollback();
                Err(self.record_failure(err))
            }
        }
    }

    fn record_failure(&self, err: LedgerError) -> LedgerError {
        match &err {
            LedgerError::StoreFailure(cause) => {
                if cause.is_lock_timeout() {
                    self.metrics.lock_timeout();
                }
                self.metrics.operation_failed();
                error!(error = %cause, "Store failure");
            }
            other => {
                self.metrics.operation_rejected();
                warn!(code = other.error_code(), reason = %other, "Operation rejected");
            }
        }
        err
    }
}

async fn credit_account(
    txn: &mut dyn StoreTransaction,
    account_number: &AccountNumber,
    amount: Amount,
) -> LedgerResult<BalanceUpdate> {
    let current = txn
        .lock_account_for_update(account_number)
        .await?
        .ok_or_else(|| LedgerError::not_found(AccountRole::Account, account_number))?;

    let new_balance = checked_credit(current, amount)?;
    txn.set_balance(account_number, new_balance).await?;

    debug!(previous = %current, new_balance = %new_balance, "Credit staged");
    Ok(BalanceUpdate {
        account_number: account_number.clone(),
        new_balance,
    })
}

async fn debit_account(
    txn: &mut dyn StoreTransaction,
    account_number: &AccountNumber,
    amount: Amount,
) -> LedgerResult<BalanceUpdate> {
    let current = txn
        .lock_account_for_update(account_number)
        .await?
        .ok_or_else(|| LedgerError::not_found(AccountRole::Account, account_number))?;

    ensure_covered(account_number, current, amount)?;
    let new_balance = current - amount.value();
    txn.set_balance(account_number, new_balance).await?;

    debug!(previous = %current, new_balance = %new_balance, "Debit staged");
    Ok(BalanceUpdate {
        account_number: account_number.clone(),
        new_balance,
    })
}

async fn move_funds(
    txn: &mut dyn StoreTransaction,
    from: &AccountNumber,
    to: &AccountNumber,
    amount: Amount,
) -> LedgerResult<()> {
    let [(first_role, first), (_, second)] = transfer_lock_order(from, to);

    // A missing row takes no lock, so both lookups run before either
    // absence is reported; the source is always reported first.
    let first_balance = txn.lock_account_for_update(first).await?;
    let second_balance = txn.lock_account_for_update(second).await?;

    let (from_balance, to_balance) = if first_role == AccountRole::Source {
        (first_balance, second_balance)
    } else {
        (second_balance, first_balance)
    };
    let from_balance =
        from_balance.ok_or_else(|| LedgerError::not_found(AccountRole::Source, from))?;
    let to_balance =
        to_balance.ok_or_else(|| LedgerError::not_found(AccountRole::Destination, to))?;

    ensure_covered(from, from_balance, amount)?;
    let new_from = from_balance - amount.value();
    let new_to = checked_credit(to_balance, amount)?;

    txn.set_balance(from, new_from).await?;
    txn.set_balance(to, new_to).await?;

    debug!(from_balance = %new_from, to_balance = %new_to, "Transfer staged");
    Ok(())
}

fn ensure_covered(
    account_number: &AccountNumber,
    available: Decimal,
    amount: Amount,
) -> LedgerResult<()> {
    if available < amount.value() {
        return Err(LedgerError::InsufficientFunds {
            account_number: account_number.clone(),
            requested: amount.value(),
            available,
        });
    }
    Ok(())
}

fn checked_credit(balance: Decimal, amount: Amount) -> LedgerResult<Decimal> {
    balance
        .checked_add(amount.value())
        .filter(|credited| *credited <= MAX_BALANCE)
        .ok_or_else(|| {
            LedgerError::InvalidAmount(AmountError::Unrepresentable(format!(
                "{balance} + {amount}"
            )))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewUser;
    use crate::registry::Registry;
    use crate::store::{Fault, MemoryStore};
    use rust_decimal_macros::dec;

    async fn setup(numbers: &[&str]) -> (MemoryStore, LedgerEngine) {
        let store = MemoryStore::new();
        let user = store.create_user(NewUser::new("alice")).await.unwrap();
        for number in numbers {
            store
                .open_account(user.id, AccountNumber::from(*number))
                .unwrap();
        }
        let engine = LedgerEngine::new(Arc::new(store.clone()));
        (store, engine)
    }

    #[tokio::test]
    async fn test_deposit_and_withdraw() {
        let (store, engine) = setup(&["1111111111"]).await;
        let account = AccountNumber::from("1111111111");

        let update = engine.deposit(&account, dec!(100.00)).await.unwrap();
        assert_eq!(update.new_balance, dec!(100));

        let update = engine.withdraw(&account, dec!(30.50)).await.unwrap();
        assert_eq!(update.new_balance, dec!(69.50));
        assert_eq!(store.balance(&account), Some(dec!(69.50)));
    }

    #[tokio::test]
    async fn test_withdraw_more_than_balance_is_refused() {
        let (store, engine) = setup(&["1111111111"]).await;
        let account = AccountNumber::from("1111111111");
        engine.deposit(&account, dec!(10)).await.unwrap();

        let err = engine.withdraw(&account, dec!(10.01)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(store.balance(&account), Some(dec!(10)));
    }

    #[tokio::test]
    async fn test_transfer_reports_missing_side() {
        let (_, engine) = setup(&["5555555555"]).await;
        let known = AccountNumber::from("5555555555");
        let missing = AccountNumber::from("0000000001");

        let err = engine.transfer(&missing, &known, dec!(1)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::AccountNotFound {
                role: AccountRole::Source,
                ..
            }
        ));

        let err = engine.transfer(&known, &missing, dec!(1)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::AccountNotFound {
                role: AccountRole::Destination,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_rejections_do_not_touch_the_store() {
        let (store, engine) = setup(&["1111111111"]).await;
        let account = AccountNumber::from("1111111111");

        // Validation happens before a transaction is opened.
        store.inject(Fault::Begin);
        assert!(matches!(
            engine.deposit(&account, dec!(0)).await,
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.transfer(&account, &account, dec!(1)).await,
            Err(LedgerError::SameAccount(_))
        ));
        assert!(matches!(
            engine.deposit(&account, dec!(1)).await,
            Err(LedgerError::StoreFailure(_))
        ));

        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.operations_rejected, 2);
        assert_eq!(snapshot.operations_failed, 1);
        assert_eq!(snapshot.operations_started, 1);
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_balance_unchanged() {
        let (store, engine) = setup(&["1111111111"]).await;
        let account = AccountNumber::from("1111111111");
        engine.deposit(&account, dec!(5)).await.unwrap();

        store.inject(Fault::Commit);
        let err = engine.deposit(&account, dec!(5)).await.unwrap_err();
        assert!(matches!(err, LedgerError::StoreFailure(_)));
        assert_eq!(err.to_string(), "internal store failure");
        assert_eq!(store.balance(&account), Some(dec!(5)));
    }

    #[tokio::test]
    async fn test_credit_is_capped_at_max_balance() {
        let (store, engine) = setup(&["1111111111", "2222222222"]).await;
        let a = AccountNumber::from("1111111111");
        let b = AccountNumber::from("2222222222");

        let update = engine.deposit(&a, MAX_BALANCE).await.unwrap();
        assert_eq!(update.new_balance, MAX_BALANCE);

        let err = engine.deposit(&a, dec!(0.01)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidAmount(AmountError::Unrepresentable(_))
        ));
        assert_eq!(store.balance(&a), Some(MAX_BALANCE));

        // The transfer credit path refuses the same way and debits nothing.
        engine.deposit(&b, dec!(1)).await.unwrap();
        let err = engine.transfer(&b, &a, dec!(1)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidAmount(AmountError::Unrepresentable(_))
        ));
        assert_eq!(store.balance(&b), Some(dec!(1)));

        engine.withdraw(&a, dec!(1)).await.unwrap();
        engine.transfer(&b, &a, dec!(1)).await.unwrap();
        assert_eq!(store.balance(&a), Some(MAX_BALANCE));
        assert_eq!(store.balance(&b), Some(dec!(0)));

        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.operations_rejected, 2);
        assert_eq!(snapshot.operations_failed, 0);
    }

    #[tokio::test]
    async fn test_execute_dispatches() {
        let (_, engine) = setup(&["1111111111", "2222222222"]).await;

        let outcome = engine
            .execute(Operation::Deposit {
                account: "1111111111".into(),
                amount: dec!(40),
            })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            OperationOutcome::Balance(BalanceUpdate {
                account_number: "1111111111".into(),
                new_balance: dec!(40),
            })
        );

        let outcome = engine
            .execute(Operation::Transfer {
                from: "1111111111".into(),
                to: "2222222222".into(),
                amount: dec!(15),
            })
            .await
            .unwrap();
        assert_eq!(outcome, OperationOutcome::Transferred);

        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.deposits, 1);
        assert_eq!(snapshot.transfers, 1);
    }
}
