//! Identifier types for LedgerBank entities.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of digits in a generated account number.
pub const ACCOUNT_NUMBER_DIGITS: usize = 10;

/// Externally visible account number.
///
/// Treated as an opaque key: the ledger never parses it, it only compares
/// it. The byte-wise ordering is the global lock order used by transfers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Wrap an externally issued account number.
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Generate a random zero-padded 10-digit account number.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let value: u64 = rng.gen_range(0..10_000_000_000);
        Self(format!("{:0width$}", value, width = ACCOUNT_NUMBER_DIGITS))
    }

    /// Get the number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountNumber {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Store-assigned user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned account row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(i64);

impl AccountId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier attached to a single engine call for log correlation.
/// Uses UUID v7 so identifiers sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new operation ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_account_number_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let number = AccountNumber::generate(&mut rng);
            assert_eq!(number.as_str().len(), ACCOUNT_NUMBER_DIGITS);
            assert!(number.as_str().chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_account_number_ordering_is_bytewise() {
        let a = AccountNumber::from("1111111111");
        let b = AccountNumber::from("2222222222");
        assert!(a < b);
        assert!(AccountNumber::from("0999") < AccountNumber::from("1"));
    }

    #[test]
    fn test_account_number_serializes_as_plain_string() {
        let number = AccountNumber::from("0000000042");
        assert_eq!(serde_json::to_string(&number).unwrap(), "\"0000000042\"");
    }

    #[test]
    fn test_operation_ids_are_unique() {
        assert_ne!(OperationId::new(), OperationId::new());
    }
}
