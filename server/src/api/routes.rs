//! Route table.

use actix_web::web;

use super::error::ApiError;
use super::handlers;

/// Configure all API routes.
///
/// ```text
/// /health                      GET
/// /metrics                     GET
/// /users                       POST
/// /users/{id}                  GET
/// /accounts                    POST
/// /accounts/deposit            POST
/// /accounts/withdraw           POST
/// /accounts/transfer           POST
/// /accounts/{account_number}   GET
/// ```
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|_, _| ApiError::invalid_payload().into()),
    )
    .app_data(web::PathConfig::default().error_handler(|_, _| {
        ApiError::new(
            actix_web::http::StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "Invalid user ID",
        )
        .into()
    }))
    .route("/health", web::get().to(handlers::health_check))
    .route("/metrics", web::get().to(handlers::metrics))
    .service(
        web::scope("/users")
            .route("", web::post().to(handlers::create_user))
            .route("/{id}", web::get().to(handlers::get_user)),
    )
    .service(
        web::scope("/accounts")
            .route("", web::post().to(handlers::create_account))
            .route("/deposit", web::post().to(handlers::deposit))
            .route("/withdraw", web::post().to(handlers::withdraw))
            .route("/transfer", web::post().to(handlers::transfer))
            .route("/{account_number}", web::get().to(handlers::get_account)),
    );
}
