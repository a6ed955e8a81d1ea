//! Account and user records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ledgerbank_common::{AccountId, AccountNumber, Currency, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 64;

/// Account product type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Savings,
    Current,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "savings",
            AccountType::Current => "current",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "savings" => Ok(AccountType::Savings),
            "current" => Ok(AccountType::Current),
            other => Err(format!("unknown account type: {other}")),
        }
    }
}

/// A bank account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Store-assigned row id.
    pub id: AccountId,
    /// Owning user.
    pub user_id: UserId,
    /// Public lookup key for all money operations.
    pub account_number: AccountNumber,
    /// Committed balance. Never negative.
    pub balance: Decimal,
    /// Currency tag.
    pub currency: Currency,
    /// Product type.
    pub account_type: AccountType,
    /// When the account was opened.
    pub created_at: DateTime<Utc>,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Input for user creation.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
}

impl NewUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    /// Trimmed username, or a description of why it is unacceptable.
    pub fn validated_username(&self) -> Result<String, String> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err("username must not be empty".to_string());
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(format!(
                "username must be at most {MAX_USERNAME_LEN} characters"
            ));
        }
        Ok(username.to_string())
    }
}

/// Input for account creation. The balance always starts at zero.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: UserId,
    pub currency: Currency,
    pub account_type: AccountType,
}

impl NewAccount {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            currency: Currency::default(),
            account_type: AccountType::default(),
        }
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_type(mut self, account_type: AccountType) -> Self {
        self.account_type = account_type;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_validation() {
        assert_eq!(NewUser::new("  alice ").validated_username().unwrap(), "alice");
        assert!(NewUser::new("   ").validated_username().is_err());
        assert!(NewUser::new("x".repeat(65)).validated_username().is_err());
    }

    #[test]
    fn test_account_type_round_trip_through_str() {
        assert_eq!("current".parse::<AccountType>().unwrap(), AccountType::Current);
        assert!("checking".parse::<AccountType>().is_err());
        assert_eq!(AccountType::default().as_str(), "savings");
    }
}
