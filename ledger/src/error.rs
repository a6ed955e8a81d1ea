//! Ledger error types.

use std::fmt;

use ledgerbank_common::{AccountNumber, AmountError, UserId};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Which side of an operation an account plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    /// The single account of a deposit, withdrawal or lookup.
    Account,
    /// The debited side of a transfer.
    Source,
    /// The credited side of a transfer.
    Destination,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccountRole::Account => "account",
            AccountRole::Source => "source account",
            AccountRole::Destination => "destination account",
        };
        f.write_str(label)
    }
}

/// Errors returned by the ledger engine and the account registry.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Amount is zero, negative, non-finite or too precise.
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// Transfer source and destination are the same account.
    #[error("Cannot transfer to the same account: {0}")]
    SameAccount(AccountNumber),

    /// No account row matches the lookup key.
    #[error("{role} not found: {account_number}")]
    AccountNotFound {
        role: AccountRole,
        account_number: AccountNumber,
    },

    /// Balance is lower than the requested debit.
    #[error("Insufficient funds in {account_number}: requested {requested}, available {available}")]
    InsufficientFunds {
        account_number: AccountNumber,
        requested: Decimal,
        available: Decimal,
    },

    /// Transactional I/O, lock or commit failure. The cause is never shown
    /// to callers, only logged.
    #[error("internal store failure")]
    StoreFailure(#[source] StoreError),

    /// User lookup found nothing.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Malformed registry input (username, currency, owning user).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl LedgerError {
    pub fn not_found(role: AccountRole, account_number: &AccountNumber) -> Self {
        LedgerError::AccountNotFound {
            role,
            account_number: account_number.clone(),
        }
    }

    /// Whether the caller caused the failure (as opposed to the store).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, LedgerError::StoreFailure(_))
    }

    /// Stable code for API payloads.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::SameAccount(_) => "SAME_ACCOUNT",
            LedgerError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::StoreFailure(_) => "STORE_FAILURE",
            LedgerError::UserNotFound(_) => "USER_NOT_FOUND",
            LedgerError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::StoreFailure(err)
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
