//! Create/read access to users and accounts.
//!
//! Registry operations never move money. The only balance they ever write is
//! the zero an account is opened with.

use async_trait::async_trait;
use ledgerbank_common::{AccountNumber, UserId};

use crate::account::{Account, NewAccount, NewUser, User};
use crate::error::LedgerResult;

/// Attempts at drawing an unused account number before giving up.
pub const ACCOUNT_NUMBER_ATTEMPTS: usize = 5;

/// User and account records.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Register a user. Usernames are unique.
    async fn create_user(&self, new_user: NewUser) -> LedgerResult<User>;

    /// Look a user up by id.
    async fn get_user(&self, user_id: UserId) -> LedgerResult<User>;

    /// Open a zero-balance account for an existing user under a freshly
    /// generated account number.
    async fn create_account(&self, new_account: NewAccount) -> LedgerResult<Account>;

    /// Read the committed state of an account.
    async fn get_account(&self, account_number: &AccountNumber) -> LedgerResult<Account>;
}
