//! Account Store
//!
//! Owns account balances. Reads that inform a mutation take the row lock
//! first and run on the unit of work's transaction.

use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};

use super::StoreError;

/// Row of the `accounts` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub balance_cents: i64,
}

/// Account balance persistence
#[derive(Debug, Clone)]
pub struct AccountStore {
    pool: PgPool,
}

impl AccountStore {
    /// Create a new AccountStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Unlocked lookup, for validation and read endpoints
    pub async fn find(&self, account_id: i64) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, user_id, balance_cents FROM accounts WHERE id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Lock the given users' rows in ascending id order.
    ///
    /// User rows serialize every unit that reads or changes a user's
    /// velocity and rate windows, across all of that user's accounts.
    pub async fn lock_users(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_ids: &[i64],
    ) -> Result<(), StoreError> {
        for user_id in lock_order(user_ids) {
            sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?;
        }

        Ok(())
    }

    /// Lock the given accounts' rows in ascending id order and return the
    /// ones that exist, in that order.
    pub async fn lock_accounts(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_ids: &[i64],
    ) -> Result<Vec<Account>, StoreError> {
        let mut locked = Vec::with_capacity(account_ids.len());

        for account_id in lock_order(account_ids) {
            let account = sqlx::query_as::<_, Account>(
                "SELECT id, user_id, balance_cents FROM accounts WHERE id = $1 FOR UPDATE",
            )
            .bind(account_id)
            .fetch_optional(&mut **tx)
            .await?;

            if let Some(account) = account {
                locked.push(account);
            }
        }

        Ok(locked)
    }

    /// Balance read under the account's row lock.
    pub async fn locked_balance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: i64,
    ) -> Result<i64, StoreError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance_cents FROM accounts WHERE id = $1 FOR UPDATE")
                .bind(account_id)
                .fetch_optional(&mut **tx)
                .await?;

        balance.ok_or(StoreError::AccountNotFound(account_id))
    }

    /// Apply a signed delta and return the new balance.
    ///
    /// Fails with `InsufficientFunds` when a debit would take the balance
    /// below zero. The check and the update run under the same lock.
    pub async fn adjust_balance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: i64,
        delta_cents: i64,
    ) -> Result<i64, StoreError> {
        let available = self.locked_balance(tx, account_id).await?;

        let new_balance = available
            .checked_add(delta_cents)
            .ok_or(StoreError::BalanceOverflow(account_id))?;

        if new_balance < 0 {
            return Err(StoreError::InsufficientFunds {
                account_id,
                required: -delta_cents,
                available,
            });
        }

        sqlx::query(
            r#"
            UPDATE accounts
            SET balance_cents = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .bind(new_balance)
        .execute(&mut **tx)
        .await?;

        Ok(new_balance)
    }
}

/// Fixed global lock order: ascending, each id once.
fn lock_order(ids: &[i64]) -> Vec<i64> {
    let mut ordered = ids.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    ordered
}
