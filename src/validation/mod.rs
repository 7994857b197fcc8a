//! Request validation
//!
//! Shape and referential checks that run before any lock is taken.
//! Every field is checked; each offending field gets exactly one error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{AmountCents, AmountError, TransferError};
use crate::error::AppError;
use crate::store::{Account, AccountStore};

pub const RECIPIENT_FIELD: &str = "recipient_account_id";
pub const AMOUNT_FIELD: &str = "amount_cents";

/// Body of a send request.
///
/// Fields are kept as raw JSON so that wrong types surface as field errors
/// instead of a body rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMoneyRequest {
    #[serde(default)]
    pub recipient_account_id: serde_json::Value,
    #[serde(default)]
    pub amount_cents: serde_json::Value,
}

impl SendMoneyRequest {
    pub fn new(recipient_account_id: i64, amount_cents: i64) -> Self {
        Self {
            recipient_account_id: recipient_account_id.into(),
            amount_cents: amount_cents.into(),
        }
    }
}

/// Field name to the error found on it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<&'static str, TransferError>,
}

impl ValidationErrors {
    /// Record an error; the first error on a field wins.
    pub fn add(&mut self, field: &'static str, error: TransferError) {
        self.fields.entry(field).or_insert(error);
    }

    pub fn get(&self, field: &str) -> Option<&TransferError> {
        self.fields.get(field)
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &TransferError)> {
        self.fields.iter().map(|(field, error)| (*field, error))
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<_> = self.fields.keys().copied().collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

/// Result of the lock-free shape checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeCheck {
    pub recipient_account_id: Option<i64>,
    pub amount: Option<AmountCents>,
    pub errors: ValidationErrors,
}

/// Type and range checks on the request body. Touches no store.
pub fn check_shape(sender_account_id: i64, request: &SendMoneyRequest, cap_cents: i64) -> ShapeCheck {
    let mut errors = ValidationErrors::default();

    let recipient_account_id = match request.recipient_account_id.as_i64() {
        Some(id) if id <= 0 => {
            errors.add(RECIPIENT_FIELD, TransferError::InvalidRecipient);
            None
        }
        Some(id) if id == sender_account_id => {
            errors.add(RECIPIENT_FIELD, TransferError::SelfTransfer);
            None
        }
        Some(id) => Some(id),
        None => {
            errors.add(RECIPIENT_FIELD, TransferError::InvalidRecipient);
            None
        }
    };

    let amount = match AmountCents::from_json(&request.amount_cents, cap_cents) {
        Ok(amount) => Some(amount),
        Err(err) => {
            errors.add(AMOUNT_FIELD, amount_error(err));
            None
        }
    };

    ShapeCheck {
        recipient_account_id,
        amount,
        errors,
    }
}

fn amount_error(err: AmountError) -> TransferError {
    let reason = match err {
        AmountError::NotInteger => "must be an integer".to_string(),
        AmountError::NotPositive(_) => "must be greater than 0".to_string(),
        AmountError::ExceedsCap { cap, .. } => format!("must not exceed {cap} cents"),
    };
    TransferError::InvalidAmount(reason)
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransfer {
    pub sender: Account,
    pub recipient: Account,
    pub amount: AmountCents,
}

/// Validates send requests against the account store
#[derive(Debug, Clone)]
pub struct Validator {
    accounts: AccountStore,
    cap_cents: i64,
}

impl Validator {
    pub fn new(accounts: AccountStore, cap_cents: i64) -> Self {
        Self {
            accounts,
            cap_cents,
        }
    }

    /// Check ownership, then every field.
    ///
    /// A sender account that is missing or owned by someone else is
    /// `Forbidden` in both cases.
    pub async fn validate(
        &self,
        caller_user_id: i64,
        sender_account_id: i64,
        request: &SendMoneyRequest,
    ) -> Result<ValidatedTransfer, AppError> {
        let sender = self
            .accounts
            .find(sender_account_id)
            .await?
            .filter(|account| account.user_id == caller_user_id)
            .ok_or(TransferError::Forbidden)?;

        let ShapeCheck {
            recipient_account_id,
            amount,
            mut errors,
        } = check_shape(sender_account_id, request, self.cap_cents);

        let mut recipient = None;
        if let Some(recipient_id) = recipient_account_id {
            recipient = self.accounts.find(recipient_id).await?;
            if recipient.is_none() {
                errors.add(RECIPIENT_FIELD, TransferError::InvalidRecipient);
            }
        }

        match (recipient, amount) {
            (Some(recipient), Some(amount)) if errors.is_empty() => Ok(ValidatedTransfer {
                sender,
                recipient,
                amount,
            }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}
