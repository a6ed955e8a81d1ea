//! Mapping of ledger errors onto HTTP responses.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use ledgerbank_common::AmountError;
use ledgerbank_ledger::{AccountRole, LedgerError, OperationKind};
use std::fmt;
use tracing::error;

use crate::models::ErrorBody;

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Body could not be decoded.
    pub fn invalid_payload() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "Invalid request payload",
        )
    }

    /// Translate a ledger error raised while running `kind`.
    pub fn for_operation(kind: OperationKind, err: LedgerError) -> Self {
        Self::translate(Some(kind), err)
    }

    fn translate(kind: Option<OperationKind>, err: LedgerError) -> Self {
        let code = err.error_code();
        match err {
            LedgerError::InvalidAmount(AmountError::NotPositive(_)) => {
                let message = match kind {
                    Some(OperationKind::Deposit) => "Deposit amount must be positive",
                    Some(OperationKind::Withdraw) => "Withdrawal amount must be positive",
                    Some(OperationKind::Transfer) => "Transfer amount must be positive",
                    None => "Amount must be positive",
                };
                Self::new(StatusCode::BAD_REQUEST, code, message)
            }
            LedgerError::InvalidAmount(_) | LedgerError::InvalidRequest(_) => {
                Self::new(StatusCode::BAD_REQUEST, code, err.to_string())
            }
            LedgerError::SameAccount(_) => Self::new(
                StatusCode::BAD_REQUEST,
                code,
                "Cannot transfer to the same account",
            ),
            LedgerError::InsufficientFunds { .. } => {
                let message = match kind {
                    Some(OperationKind::Transfer) => "Insufficient funds in source account",
                    _ => "Insufficient funds",
                };
                Self::new(StatusCode::BAD_REQUEST, code, message)
            }
            LedgerError::AccountNotFound { role, .. } => {
                let message = match role {
                    AccountRole::Account => "Account not found",
                    AccountRole::Source => "Source account not found",
                    AccountRole::Destination => "Destination account not found",
                };
                Self::new(StatusCode::NOT_FOUND, code, message)
            }
            LedgerError::UserNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, code, "User not found")
            }
            LedgerError::StoreFailure(cause) => {
                error!(error = %cause, "Request failed in the account store");
                let message = match kind {
                    Some(OperationKind::Deposit) => "Failed to process deposit",
                    Some(OperationKind::Withdraw) => "Failed to process withdrawal",
                    Some(OperationKind::Transfer) => "Failed to process transfer",
                    None => "Internal server error",
                };
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
            }
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::translate(None, err)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status).json(ErrorBody {
            error: self.message.clone(),
            code: self.code.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbank_ledger::StoreError;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_message_follows_operation() {
        let err = ApiError::for_operation(
            OperationKind::Withdraw,
            LedgerError::InvalidAmount(AmountError::NotPositive(dec!(0))),
        );
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Withdrawal amount must be positive");
    }

    #[test]
    fn test_not_found_roles() {
        let number = ledgerbank_common::AccountNumber::from("1234567890");
        let err = ApiError::for_operation(
            OperationKind::Transfer,
            LedgerError::not_found(AccountRole::Destination, &number),
        );
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Destination account not found");
    }

    #[test]
    fn test_store_failure_hides_cause() {
        let err = ApiError::for_operation(
            OperationKind::Deposit,
            LedgerError::StoreFailure(StoreError::Database("connection reset".to_string())),
        );
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Failed to process deposit");
        assert!(!err.to_string().contains("connection reset"));
    }
}
