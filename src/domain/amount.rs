//! Amount type
//!
//! Domain primitive for transfer amounts, held as integer cents.
//! Positivity is validated at construction; the per-transfer cap is a
//! policy value and is checked against [`crate::limits::TransferLimits`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// AmountCents is a strictly positive number of cents.
///
/// # Example
/// ```
/// use ewallet::domain::AmountCents;
///
/// let amount = AmountCents::new(2_500_000).unwrap();
/// assert_eq!(amount.to_string(), "$25000.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct AmountCents(i64);

/// Errors that can occur when creating an AmountCents
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(i64),

    #[error("Amount {cents} exceeds the single transfer cap of {cap}")]
    ExceedsCap { cents: i64, cap: i64 },

    #[error("Amount must be an integer number of cents")]
    NotInteger,
}

impl AmountCents {
    /// Create a new amount. Fails with `NotPositive` for zero or negatives.
    pub fn new(cents: i64) -> Result<Self, AmountError> {
        if cents <= 0 {
            return Err(AmountError::NotPositive(cents));
        }
        Ok(Self(cents))
    }

    /// Create a new amount that must also be at most `cap` cents.
    pub fn with_cap(cents: i64, cap: i64) -> Result<Self, AmountError> {
        let amount = Self::new(cents)?;
        if cents > cap {
            return Err(AmountError::ExceedsCap { cents, cap });
        }
        Ok(amount)
    }

    /// Parse an amount out of a loosely-typed JSON value.
    ///
    /// Only JSON integers are accepted; floats, strings, arrays and objects
    /// are rejected with `NotInteger`.
    pub fn from_json(value: &serde_json::Value, cap: i64) -> Result<Self, AmountError> {
        let cents = value.as_i64().ok_or(AmountError::NotInteger)?;
        Self::with_cap(cents, cap)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Signed delta for the sending side of a transfer.
    pub fn as_debit(&self) -> i64 {
        -self.0
    }

    /// Signed delta for the receiving side of a transfer.
    pub fn as_credit(&self) -> i64 {
        self.0
    }
}

/// Render integer cents as a two-place decimal.
pub fn dollars(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

impl fmt::Display for AmountCents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", dollars(self.0))
    }
}

impl TryFrom<i64> for AmountCents {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        AmountCents::new(value)
    }
}

impl From<AmountCents> for i64 {
    fn from(amount: AmountCents) -> Self {
        amount.0
    }
}
