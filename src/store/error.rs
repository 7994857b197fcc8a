//! Store Errors
//!
//! Error types for balance and ledger persistence.

/// SQLSTATE for `lock_not_available` (lock_timeout expired)
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// SQLSTATE for `deadlock_detected`
const DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE for `serialization_failure`
const SERIALIZATION_FAILURE: &str = "40001";

/// Errors that can occur in the account and ledger stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Waiting for a row lock exceeded the unit's lock timeout
    #[error("Timed out waiting for a row lock")]
    LockTimeout,

    /// PostgreSQL broke a lock cycle by aborting this unit
    #[error("Deadlock detected")]
    Deadlock,

    /// Concurrent update made the unit unserializable
    #[error("Serialization failure")]
    SerializationFailure,

    /// No connection became available in time
    #[error("Connection pool timed out")]
    PoolTimedOut,

    /// Account row does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    /// Debit would take the balance below zero
    #[error("Insufficient funds on account {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: i64,
        required: i64,
        available: i64,
    },

    /// Credit would overflow the balance column
    #[error("Balance overflow on account {0}")]
    BalanceOverflow(i64),

    /// Any other database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Check if retrying the whole unit of work may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::LockTimeout
                | StoreError::Deadlock
                | StoreError::SerializationFailure
                | StoreError::PoolTimedOut
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let code = match &err {
            sqlx::Error::PoolTimedOut => return StoreError::PoolTimedOut,
            sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
            _ => None,
        };

        classify(code.as_deref()).unwrap_or(StoreError::Database(err))
    }
}

fn classify(code: Option<&str>) -> Option<StoreError> {
    match code? {
        LOCK_NOT_AVAILABLE => Some(StoreError::LockTimeout),
        DEADLOCK_DETECTED => Some(StoreError::Deadlock),
        SERIALIZATION_FAILURE => Some(StoreError::SerializationFailure),
        _ => None,
    }
}
