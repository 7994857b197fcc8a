//! Command definitions
//!
//! Commands represent intentions to change the system state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::SendMoneyRequest;

/// Command to send money out of one of the caller's accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMoneyCommand {
    /// Account the money leaves (from the request path)
    pub sender_account_id: i64,
    /// Unvalidated request body
    pub request: SendMoneyRequest,
}

impl SendMoneyCommand {
    pub fn new(sender_account_id: i64, request: SendMoneyRequest) -> Self {
        Self {
            sender_account_id,
            request,
        }
    }

    /// Command with well-typed fields, for callers that are not HTTP
    pub fn of(sender_account_id: i64, recipient_account_id: i64, amount_cents: i64) -> Self {
        Self::new(
            sender_account_id,
            SendMoneyRequest::new(recipient_account_id, amount_cents),
        )
    }
}

/// Result of a committed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMoneyResult {
    /// Id of the debit entry; identifies the transfer
    pub transaction_id: i64,
    /// Id of the credit entry
    pub credit_transaction_id: i64,
    pub sender_account_id: i64,
    pub recipient_account_id: i64,
    pub amount_cents: i64,
    pub sender_balance_cents: i64,
    pub recipient_balance_cents: i64,
    pub created_at: DateTime<Utc>,
}
