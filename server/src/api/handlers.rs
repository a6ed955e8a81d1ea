//! Request handlers.
//!
//! Each handler decodes its input, makes one registry or engine call and
//! encodes the result. Failures become [`ApiError`] responses.

use actix_web::{web, HttpResponse};
use ledgerbank_common::{AccountNumber, Currency, UserId};
use ledgerbank_ledger::{LedgerError, NewAccount, NewUser, OperationKind};
use tracing::{info, warn};

use super::error::ApiError;
use crate::models::{
    AmountRequest, BalanceResponse, CreateAccountRequest, CreateUserRequest, HealthResponse,
    MessageResponse, TransferRequest,
};
use crate::state::AppState;

type ApiResult = Result<HttpResponse, ApiError>;

/// `POST /users`
pub async fn create_user(
    state: web::Data<AppState>,
    body: web::Json<CreateUserRequest>,
) -> ApiResult {
    let body = body.into_inner();
    let user = state.registry.create_user(NewUser::new(body.username)).await?;

    info!(user_id = %user.id, "User created");
    Ok(HttpResponse::Created().json(user))
}

/// `GET /users/{id}`
pub async fn get_user(state: web::Data<AppState>, path: web::Path<i64>) -> ApiResult {
    let user = state.registry.get_user(UserId::new(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// `POST /accounts`
pub async fn create_account(
    state: web::Data<AppState>,
    body: web::Json<CreateAccountRequest>,
) -> ApiResult {
    let body = body.into_inner();

    let mut new_account = NewAccount::new(body.user_id);
    if let Some(account_type) = body.account_type {
        new_account = new_account.with_type(account_type);
    }
    if let Some(code) = body.currency {
        let currency =
            Currency::parse(&code).map_err(|e| LedgerError::InvalidRequest(e.to_string()))?;
        new_account = new_account.with_currency(currency);
    }

    let account = state.registry.create_account(new_account).await?;
    Ok(HttpResponse::Created().json(account))
}

/// `GET /accounts/{account_number}`
pub async fn get_account(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let account_number = AccountNumber::new(path.into_inner());
    let account = state.registry.get_account(&account_number).await?;
    Ok(HttpResponse::Ok().json(account))
}

/// `POST /accounts/deposit`
pub async fn deposit(state: web::Data<AppState>, body: web::Json<AmountRequest>) -> ApiResult {
    let body = body.into_inner();
    let update = state
        .engine
        .deposit(&body.account_number, body.amount)
        .await
        .map_err(|e| ApiError::for_operation(OperationKind::Deposit, e))?;

    Ok(HttpResponse::Ok().json(BalanceResponse {
        message: "Deposit successful".to_string(),
        account_number: update.account_number,
        new_balance: update.new_balance,
    }))
}

/// `POST /accounts/withdraw`
pub async fn withdraw(state: web::Data<AppState>, body: web::Json<AmountRequest>) -> ApiResult {
    let body = body.into_inner();
    let update = state
        .engine
        .withdraw(&body.account_number, body.amount)
        .await
        .map_err(|e| ApiError::for_operation(OperationKind::Withdraw, e))?;

    Ok(HttpResponse::Ok().json(BalanceResponse {
        message: "Withdrawal successful".to_string(),
        account_number: update.account_number,
        new_balance: update.new_balance,
    }))
}

/// `POST /accounts/transfer`
pub async fn transfer(state: web::Data<AppState>, body: web::Json<TransferRequest>) -> ApiResult {
    let body = body.into_inner();
    state
        .engine
        .transfer(
            &body.from_account_number,
            &body.to_account_number,
            body.amount,
        )
        .await
        .map_err(|e| ApiError::for_operation(OperationKind::Transfer, e))?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Transfer successful".to_string(),
    }))
}

/// `GET /health`
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let store_ok = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Store health probe failed");
            false
        }
    };

    let body = HealthResponse {
        status: if store_ok { "healthy" } else { "degraded" }.to_string(),
        store: store_ok,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    if store_ok {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// `GET /metrics`
pub async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(state.metrics().to_prometheus())
}
