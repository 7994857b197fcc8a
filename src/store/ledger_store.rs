//! Ledger Store
//!
//! Append-only store of transfer legs and the rolling-window aggregates the
//! limiters are evaluated against. Window queries join through
//! `accounts.user_id` so that every account a user owns shares one window;
//! they are served by `accounts(user_id)` and
//! `transactions(account_id, created_at)`.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{LedgerEntry, NewEntry, TransferPair};

use super::StoreError;

/// Which side of the ledger a window sum covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Debits (`amount_cents < 0`)
    Outbound,
    /// Credits (`amount_cents > 0`)
    Inbound,
}

const OUTBOUND_WINDOW_SQL: &str = r#"
    SELECT COALESCE(SUM(t.amount_cents), 0)::BIGINT
    FROM transactions t
    JOIN accounts a ON a.id = t.account_id
    WHERE a.user_id = $1
      AND t.amount_cents < 0
      AND t.created_at > $2
"#;

const INBOUND_WINDOW_SQL: &str = r#"
    SELECT COALESCE(SUM(t.amount_cents), 0)::BIGINT
    FROM transactions t
    JOIN accounts a ON a.id = t.account_id
    WHERE a.user_id = $1
      AND t.amount_cents > 0
      AND t.created_at > $2
"#;

/// Ledger persistence
#[derive(Debug, Clone)]
pub struct LedgerStore {
    pool: PgPool,
}

impl LedgerStore {
    /// Create a new LedgerStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert both legs of a transfer on the unit of work.
    ///
    /// The debit is inserted first; the credit's `parent_id` is the debit's
    /// id. Either insert failing fails the unit, so no half pair commits.
    pub async fn append_pair(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        debit: &NewEntry,
        credit: &NewEntry,
    ) -> Result<TransferPair, StoreError> {
        let debit = self.insert_entry(tx, debit, None).await?;
        let credit = self.insert_entry(tx, credit, Some(debit.id)).await?;

        Ok(TransferPair { debit, credit })
    }

    async fn insert_entry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &NewEntry,
        parent_id: Option<i64>,
    ) -> Result<LedgerEntry, StoreError> {
        let inserted = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO transactions (account_id, amount_cents, parent_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, account_id, amount_cents, parent_id, created_at
            "#,
        )
        .bind(entry.account_id)
        .bind(entry.amount_cents)
        .bind(parent_id)
        .bind(entry.created_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(inserted)
    }

    /// Signed sum of one side of a user's ledger for entries newer than
    /// `since`.
    ///
    /// The window has no upper bound, so an entry committed by a unit that
    /// started later is never missed. Outbound sums are zero or negative,
    /// inbound sums zero or positive.
    pub async fn sum_window(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        direction: Direction,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let sql = match direction {
            Direction::Outbound => OUTBOUND_WINDOW_SQL,
            Direction::Inbound => INBOUND_WINDOW_SQL,
        };

        let sum: i64 = sqlx::query_scalar(sql)
            .bind(user_id)
            .bind(since)
            .fetch_one(&mut **tx)
            .await?;

        Ok(sum)
    }

    /// Number of committed transfers a user sent after `since`.
    ///
    /// A send is a debit leg that has a paired credit.
    pub async fn count_sends(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM transactions d
            JOIN accounts a ON a.id = d.account_id
            WHERE a.user_id = $1
              AND d.parent_id IS NULL
              AND d.amount_cents < 0
              AND d.created_at > $2
              AND EXISTS (SELECT 1 FROM transactions c WHERE c.parent_id = d.id)
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&mut **tx)
        .await?;

        Ok(count)
    }

    /// Load the debit/credit pair that `transaction_id` belongs to.
    ///
    /// Either leg's id resolves to the same pair. Entries without a partner
    /// (seeded or imported rows) yield `None`.
    pub async fn find_pair(&self, transaction_id: i64) -> Result<Option<TransferPair>, StoreError> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            "SELECT id, account_id, amount_cents, parent_id, created_at FROM transactions WHERE id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(entry) = entry else {
            return Ok(None);
        };

        let pair = match entry.parent_id {
            Some(parent_id) => sqlx::query_as::<_, LedgerEntry>(
                "SELECT id, account_id, amount_cents, parent_id, created_at FROM transactions WHERE id = $1",
            )
            .bind(parent_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|debit| TransferPair {
                debit,
                credit: entry,
            }),
            None => sqlx::query_as::<_, LedgerEntry>(
                "SELECT id, account_id, amount_cents, parent_id, created_at FROM transactions WHERE parent_id = $1",
            )
            .bind(entry.id)
            .fetch_optional(&self.pool)
            .await?
            .map(|credit| TransferPair {
                debit: entry,
                credit,
            }),
        };

        Ok(pair)
    }
}
