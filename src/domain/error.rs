//! Transfer Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::amount::dollars;

/// Reasons a transfer can be rejected.
///
/// Validation errors are field-scoped and client-correctable. Policy
/// rejections are raised inside the unit of work and leave no effect.
/// `Forbidden` is returned without saying whether the account exists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Recipient missing, not an integer, or not an existing account
    #[error("The selected recipient account is invalid")]
    InvalidRecipient,

    /// Amount missing, not an integer, or outside 1..=cap
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Recipient equals sender
    #[error("Cannot send money to the sending account")]
    SelfTransfer,

    /// Sender account is not owned by the caller
    #[error("Account does not belong to the caller")]
    Forbidden,

    /// Sender's user would exceed its rolling 24h outbound volume
    #[error("Outbound limit exceeded: {} sent in the last 24h, {} requested, limit {}", dollars(*window_total), dollars(*requested), dollars(*limit))]
    OutboundLimitExceeded {
        window_total: i64,
        requested: i64,
        limit: i64,
    },

    /// Recipient's user would exceed its rolling 24h inbound volume
    #[error("Inbound limit exceeded: {} received in the last 24h, {} requested, limit {}", dollars(*window_total), dollars(*requested), dollars(*limit))]
    InboundLimitExceeded {
        window_total: i64,
        requested: i64,
        limit: i64,
    },

    /// Sender's user has used up its hourly send count
    #[error("Rate limited: {recent_sends} sends in the last hour (limit {limit})")]
    RateLimited { recent_sends: i64, limit: i64 },

    /// Sender balance below the requested amount
    #[error("Insufficient funds: required {}, available {}", dollars(*required), dollars(*available))]
    InsufficientFunds { required: i64, available: i64 },
}

impl TransferError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(required: i64, available: i64) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRecipient => "invalid_recipient",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::SelfTransfer => "self_transfer",
            Self::Forbidden => "forbidden",
            Self::OutboundLimitExceeded { .. } => "outbound_limit_exceeded",
            Self::InboundLimitExceeded { .. } => "inbound_limit_exceeded",
            Self::RateLimited { .. } => "rate_limited",
            Self::InsufficientFunds { .. } => "insufficient_funds",
        }
    }

    /// Rejected by a limiter or the balance check
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            Self::OutboundLimitExceeded { .. }
                | Self::InboundLimitExceeded { .. }
                | Self::RateLimited { .. }
                | Self::InsufficientFunds { .. }
        )
    }
}
