//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, State},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{dollars, LedgerEntry, OperationContext, TransferError};
use crate::error::{AppError, AppResult};
use crate::handlers::SendMoneyCommand;
use crate::store::{AccountStore, LedgerStore};
use crate::validation::SendMoneyRequest;

use super::middleware::RequestUser;
use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMoneyResponse {
    pub transaction_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: i64,
    pub user_id: i64,
    pub balance_cents: i64,
    pub balance: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferPairResponse {
    pub transaction_id: i64,
    pub amount_cents: i64,
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/accounts/:account_id/send", post(send_money))
        .route("/accounts/:account_id", get(get_account))
        .route("/transactions/:transaction_id", get(get_transaction))
}

// =========================================================================
// POST /accounts/:account_id/send
// =========================================================================

/// Send money from one of the caller's accounts.
///
/// An unreadable body is treated as empty so that the ownership check
/// still runs first and field errors come back in the usual shape.
async fn send_money(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<i64>,
    payload: Option<Json<SendMoneyRequest>>,
) -> AppResult<Json<SendMoneyResponse>> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    let result = state
        .engine
        .execute(SendMoneyCommand::new(account_id, request), &context)
        .await?;

    Ok(Json(SendMoneyResponse {
        transaction_id: result.transaction_id,
    }))
}

// =========================================================================
// GET /accounts/:account_id
// =========================================================================

/// Balance of one of the caller's accounts
async fn get_account(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Path(account_id): Path<i64>,
) -> AppResult<Json<AccountResponse>> {
    let account = AccountStore::new(state.pool)
        .find(account_id)
        .await?
        .filter(|account| account.user_id == user.user_id)
        .ok_or(TransferError::Forbidden)?;

    Ok(Json(AccountResponse {
        id: account.id,
        user_id: account.user_id,
        balance_cents: account.balance_cents,
        balance: dollars(account.balance_cents),
    }))
}

// =========================================================================
// GET /transactions/:transaction_id
// =========================================================================

/// Both legs of a transfer the caller sent or received
async fn get_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Path(transaction_id): Path<i64>,
) -> AppResult<Json<TransferPairResponse>> {
    let not_found = || AppError::NotFound(format!("transaction {transaction_id}"));

    let pair = LedgerStore::new(state.pool.clone())
        .find_pair(transaction_id)
        .await?
        .ok_or_else(not_found)?;

    let accounts = AccountStore::new(state.pool);
    let mut visible = false;
    for account_id in [pair.debit.account_id, pair.credit.account_id] {
        if let Some(account) = accounts.find(account_id).await? {
            visible |= account.user_id == user.user_id;
        }
    }
    if !visible {
        return Err(not_found());
    }

    Ok(Json(TransferPairResponse {
        transaction_id: pair.debit.id,
        amount_cents: pair.amount_cents(),
        debit: pair.debit,
        credit: pair.credit,
    }))
}
