//! LedgerBank Server
//!
//! HTTP front end for the ledger: user and account records plus deposit,
//! withdrawal and transfer endpoints. All money movement is delegated to
//! [`ledgerbank_ledger::LedgerEngine`].

pub mod api;
pub mod config;
pub mod models;
pub mod state;

pub use config::{ConfigError, ServerConfig, StoreBackend};
pub use state::AppState;
