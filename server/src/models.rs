//! Request and response bodies.

use ledgerbank_common::{AccountNumber, UserId};
use ledgerbank_ledger::AccountType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `POST /users`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

/// `POST /accounts`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// `POST /accounts/deposit` and `POST /accounts/withdraw`
///
/// The amount is taken as a raw decimal (JSON number or string) so the
/// engine can report exactly why it is unacceptable.
#[derive(Debug, Clone, Deserialize)]
pub struct AmountRequest {
    pub account_number: AccountNumber,
    pub amount: Decimal,
}

/// `POST /accounts/transfer`
#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub from_account_number: AccountNumber,
    pub to_account_number: AccountNumber,
    pub amount: Decimal,
}

/// Deposit and withdrawal result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub message: String,
    pub account_number: AccountNumber,
    pub new_balance: Decimal,
}

/// Plain acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: bool,
    pub version: String,
}
