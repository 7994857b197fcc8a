//! Ledger entry types
//!
//! A transfer is recorded as a debit row on the sender's account and a
//! credit row on the recipient's account, linked through `parent_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AmountCents;

/// A persisted row of the `transactions` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: i64,
    pub amount_cents: i64,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn is_debit(&self) -> bool {
        self.amount_cents < 0
    }

    pub fn is_credit(&self) -> bool {
        self.amount_cents > 0
    }
}

/// An entry waiting to be appended. Ids and parent links are assigned by
/// the ledger store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub account_id: i64,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl NewEntry {
    /// Debit and credit legs of moving `amount` between two accounts.
    pub fn pair(
        sender_account_id: i64,
        recipient_account_id: i64,
        amount: AmountCents,
        at: DateTime<Utc>,
    ) -> (NewEntry, NewEntry) {
        (
            NewEntry {
                account_id: sender_account_id,
                amount_cents: amount.as_debit(),
                created_at: at,
            },
            NewEntry {
                account_id: recipient_account_id,
                amount_cents: amount.as_credit(),
                created_at: at,
            },
        )
    }
}

/// Both legs of one transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPair {
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

impl TransferPair {
    /// Double-entry invariants: the credit points at the debit, the amounts
    /// cancel out, and the legs live on different accounts.
    pub fn is_balanced(&self) -> bool {
        self.debit.parent_id.is_none()
            && self.credit.parent_id == Some(self.debit.id)
            && self.debit.is_debit()
            && self.credit.is_credit()
            && self.debit.amount_cents + self.credit.amount_cents == 0
            && self.debit.account_id != self.credit.account_id
    }

    pub fn amount_cents(&self) -> i64 {
        self.credit.amount_cents
    }
}
