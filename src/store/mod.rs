//! Store module
//!
//! Persistence layer for balances and the ledger.
//! Every money-state mutation runs inside one PostgreSQL transaction
//! (the unit of work) opened by [`begin_unit`].

mod account_store;
mod error;
mod ledger_store;

use std::time::Duration;

use sqlx::{PgPool, Postgres, Transaction};

pub use account_store::{Account, AccountStore};
pub use error::StoreError;
pub use ledger_store::{Direction, LedgerStore};

/// Open a unit of work whose lock waits are bounded by `lock_timeout`.
///
/// A lock wait that runs out fails the statement with `55P03`, which
/// surfaces as the retryable [`StoreError::LockTimeout`].
pub async fn begin_unit(
    pool: &PgPool,
    lock_timeout: Duration,
) -> Result<Transaction<'static, Postgres>, StoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(lock_timeout_setting(lock_timeout))
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}

fn lock_timeout_setting(timeout: Duration) -> String {
    // 0 disables the timeout in PostgreSQL, so never round down to it
    format!("{}ms", timeout.as_millis().max(1))
}
