//! Monetary types for LedgerBank.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fractional digits allowed in an amount (minor units, e.g. cents).
pub const MONEY_SCALE: u32 = 2;

/// Largest balance an account may hold: 999999999999999999.99, the range of
/// a `NUMERIC(20, 2)` column.
pub const MAX_BALANCE: Decimal = Decimal::from_parts(1_661_992_959, 1_808_227_885, 5, false, 2);

/// Reasons an amount is rejected before any ledger work starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount must be positive, got {0}")]
    NotPositive(Decimal),

    #[error("amount {0} has too many decimal places")]
    TooPrecise(Decimal),

    #[error("amount {0} cannot be represented exactly")]
    Unrepresentable(String),
}

/// A strictly positive money quantity in minor-unit precision.
///
/// All balance arithmetic in the ledger is done on [`Decimal`]; this type only
/// guarantees that what enters the engine is well formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// Validate a decimal quantity.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        let normalized = value.normalize();
        if normalized.scale() > MONEY_SCALE {
            return Err(AmountError::TooPrecise(value));
        }

        Ok(Self(normalized))
    }

    /// Get the decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned for malformed currency codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid currency code: {0:?}")]
pub struct CurrencyError(pub String);

/// ISO 4217 style currency code tag carried by an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse a three-letter code, case-insensitively.
    pub fn parse(code: &str) -> Result<Self, CurrencyError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CurrencyError(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_rejects_zero_and_negative() {
        assert_eq!(Amount::new(dec!(0)), Err(AmountError::NotPositive(dec!(0))));
        assert_eq!(Amount::new(dec!(-5)), Err(AmountError::NotPositive(dec!(-5))));
    }

    #[test]
    fn test_amount_scale() {
        assert_eq!(Amount::new(dec!(50.00)).unwrap().value(), dec!(50));
        assert!(Amount::new(dec!(0.01)).is_ok());
        assert_eq!(
            Amount::new(dec!(0.001)),
            Err(AmountError::TooPrecise(dec!(0.001)))
        );
    }

    #[test]
    fn test_max_balance_matches_column_range() {
        assert_eq!(MAX_BALANCE, dec!(999999999999999999.99));
        assert_eq!(MAX_BALANCE.scale(), MONEY_SCALE);
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse("eur").unwrap().code(), "EUR");
        assert!(Currency::parse("EURO").is_err());
        assert!(Currency::parse("U$D").is_err());
        assert_eq!(Currency::default(), Currency::usd());
    }
}
