//! Common test utilities
//!
//! Database-backed tests need `DATABASE_URL`; without it they return early.
//! Every test provisions its own users and accounts, so tests can share one
//! database and run in parallel.

#![allow(dead_code)]

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use ewallet::OperationContext;

/// Connect and migrate, or `None` when no database is configured
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    ewallet::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

/// Current time at database precision (microseconds)
pub fn db_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn as_user(user_id: i64) -> OperationContext {
    OperationContext::new().with_request_user(user_id)
}

pub async fn create_user(pool: &PgPool) -> i64 {
    sqlx::query_scalar("INSERT INTO users (name) VALUES ('test user') RETURNING id")
        .fetch_one(pool)
        .await
        .expect("Failed to seed user")
}

pub async fn create_account(pool: &PgPool, user_id: i64, balance_cents: i64) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO accounts (user_id, balance_cents) VALUES ($1, $2) RETURNING id",
    )
    .bind(user_id)
    .bind(balance_cents)
    .fetch_one(pool)
    .await
    .expect("Failed to seed account")
}

/// A user owning one account
pub async fn create_user_with_account(pool: &PgPool, balance_cents: i64) -> (i64, i64) {
    let user_id = create_user(pool).await;
    let account_id = create_account(pool, user_id, balance_cents).await;
    (user_id, account_id)
}

/// Insert a bare ledger row (no pair), as history seeded from elsewhere
pub async fn insert_entry(pool: &PgPool, account_id: i64, amount_cents: i64, created_at: DateTime<Utc>) {
    sqlx::query(
        r#"
        INSERT INTO transactions (account_id, amount_cents, created_at, updated_at)
        VALUES ($1, $2, $3, $3)
        "#,
    )
    .bind(account_id)
    .bind(amount_cents)
    .bind(created_at)
    .execute(pool)
    .await
    .expect("Failed to seed transaction");
}

pub async fn balance(pool: &PgPool, account_id: i64) -> i64 {
    sqlx::query_scalar("SELECT balance_cents FROM accounts WHERE id = $1")
        .bind(account_id)
        .fetch_one(pool)
        .await
        .expect("Failed to read balance")
}

pub async fn entry_count(pool: &PgPool, account_ids: &[i64]) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE account_id = ANY($1)")
        .bind(account_ids)
        .fetch_one(pool)
        .await
        .expect("Failed to count transactions")
}

/// Balances of the given accounts plus their ledger row count
#[derive(Debug, PartialEq, Eq)]
pub struct MoneyState {
    pub balances: Vec<i64>,
    pub entries: i64,
}

pub async fn money_state(pool: &PgPool, account_ids: &[i64]) -> MoneyState {
    let mut balances = Vec::with_capacity(account_ids.len());
    for account_id in account_ids {
        balances.push(balance(pool, *account_id).await);
    }
    MoneyState {
        balances,
        entries: entry_count(pool, account_ids).await,
    }
}
