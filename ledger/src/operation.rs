//! Transient descriptions of money movements.

use std::fmt;

use ledgerbank_common::{AccountNumber, Amount};
use rust_decimal::Decimal;

use crate::error::{AccountRole, LedgerError, LedgerResult};

/// Kind of money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Deposit,
    Withdraw,
    Transfer,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request against the ledger. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Deposit {
        account: AccountNumber,
        amount: Decimal,
    },
    Withdraw {
        account: AccountNumber,
        amount: Decimal,
    },
    Transfer {
        from: AccountNumber,
        to: AccountNumber,
        amount: Decimal,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Deposit { .. } => OperationKind::Deposit,
            Operation::Withdraw { .. } => OperationKind::Withdraw,
            Operation::Transfer { .. } => OperationKind::Transfer,
        }
    }

    /// Requested quantity, unvalidated.
    pub fn amount(&self) -> Decimal {
        match self {
            Operation::Deposit { amount, .. }
            | Operation::Withdraw { amount, .. }
            | Operation::Transfer { amount, .. } => *amount,
        }
    }

    /// Checks that need no store access. Runs before any transaction is opened.
    pub fn validate(&self) -> LedgerResult<Amount> {
        let amount = Amount::new(self.amount())?;

        if let Operation::Transfer { from, to, .. } = self {
            if from == to {
                return Err(LedgerError::SameAccount(from.clone()));
            }
        }

        Ok(amount)
    }
}

/// Order in which a transfer locks its two rows.
///
/// Always ascending by account number regardless of direction, so any two
/// transfers over the same pair request the locks in the same order.
pub fn transfer_lock_order<'a>(
    from: &'a AccountNumber,
    to: &'a AccountNumber,
) -> [(AccountRole, &'a AccountNumber); 2] {
    if from <= to {
        [(AccountRole::Source, from), (AccountRole::Destination, to)]
    } else {
        [(AccountRole::Destination, to), (AccountRole::Source, from)]
    }
}
