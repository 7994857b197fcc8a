//! Transfer Engine
//!
//! Moves money between accounts:
//! `Received → Validated → LimitChecked → Committed | Rejected`.
//!
//! Validation runs lock-free. Everything after it runs in one unit of work
//! that locks the owning users and then both accounts (each in ascending id
//! order), re-reads balances and ledger windows under those locks, and only
//! then mutates. Any early return drops the transaction, which rolls it back.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::PgPool;

use crate::config::EngineConfig;
use crate::domain::{NewEntry, OperationContext, TransferError};
use crate::error::AppError;
use crate::limits::LimitEnforcer;
use crate::store::{self, AccountStore, LedgerStore};
use crate::validation::{ValidatedTransfer, ValidationErrors, Validator, RECIPIENT_FIELD};

use super::{SendMoneyCommand, SendMoneyResult};

/// Orchestrates validation, limit checks and the atomic ledger write
#[derive(Debug, Clone)]
pub struct TransferEngine {
    pool: PgPool,
    accounts: AccountStore,
    ledger: LedgerStore,
    validator: Validator,
    limits: LimitEnforcer,
    config: EngineConfig,
}

impl TransferEngine {
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, EngineConfig::default())
    }

    pub fn with_config(pool: PgPool, config: EngineConfig) -> Self {
        let accounts = AccountStore::new(pool.clone());
        let ledger = LedgerStore::new(pool.clone());

        Self {
            validator: Validator::new(accounts.clone(), config.limits.per_transfer_cap_cents),
            limits: LimitEnforcer::new(ledger.clone(), config.limits),
            accounts,
            ledger,
            pool,
            config,
        }
    }

    /// Execute the send at the current time.
    ///
    /// The clock is read inside the unit of work, after every lock is held.
    pub async fn execute(
        &self,
        command: SendMoneyCommand,
        context: &OperationContext,
    ) -> Result<SendMoneyResult, AppError> {
        self.run(command, context, None).await
    }

    /// Execute the send as of `now`.
    ///
    /// `now` opens the velocity and rate windows and stamps the new
    /// ledger entries.
    pub async fn execute_at(
        &self,
        command: SendMoneyCommand,
        context: &OperationContext,
        now: DateTime<Utc>,
    ) -> Result<SendMoneyResult, AppError> {
        self.run(command, context, Some(now)).await
    }

    async fn run(
        &self,
        command: SendMoneyCommand,
        context: &OperationContext,
        fixed_now: Option<DateTime<Utc>>,
    ) -> Result<SendMoneyResult, AppError> {
        let caller = context.request_user_id.ok_or(AppError::Unauthenticated)?;

        let transfer = match self
            .validator
            .validate(caller, command.sender_account_id, &command.request)
            .await
        {
            Ok(transfer) => transfer,
            Err(e) => {
                tracing::info!(
                    correlation_id = ?context.correlation_id,
                    sender_account_id = command.sender_account_id,
                    error = %e,
                    "Transfer rejected during validation"
                );
                return Err(e);
            }
        };

        self.commit(caller, &command, transfer, context, fixed_now)
            .await
    }

    /// Run the unit of work, retrying on contention.
    ///
    /// Each retry validates the command again so that the next attempt locks
    /// the accounts' current owners.
    async fn commit(
        &self,
        caller: i64,
        command: &SendMoneyCommand,
        mut transfer: ValidatedTransfer,
        context: &OperationContext,
        fixed_now: Option<DateTime<Utc>>,
    ) -> Result<SendMoneyResult, AppError> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.try_commit(caller, &transfer, fixed_now).await {
                Ok(result) => {
                    tracing::info!(
                        correlation_id = ?context.correlation_id,
                        transaction_id = result.transaction_id,
                        sender_account_id = result.sender_account_id,
                        recipient_account_id = result.recipient_account_id,
                        amount_cents = result.amount_cents,
                        "Transfer committed"
                    );
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = backoff(attempt);
                    tracing::warn!(
                        correlation_id = ?context.correlation_id,
                        sender_account_id = transfer.sender.id,
                        "Lock contention, retrying (attempt {}/{}) in {:?}",
                        attempt,
                        max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;

                    transfer = self
                        .validator
                        .validate(caller, command.sender_account_id, &command.request)
                        .await?;
                }
                Err(e) => {
                    tracing::info!(
                        correlation_id = ?context.correlation_id,
                        sender_account_id = transfer.sender.id,
                        recipient_account_id = transfer.recipient.id,
                        amount_cents = transfer.amount.cents(),
                        policy_rejection = e
                            .transfer_error()
                            .is_some_and(TransferError::is_policy_rejection),
                        error = %e,
                        "Transfer rejected"
                    );
                    return Err(e);
                }
            }
        }

        Err(AppError::Contention)
    }

    /// One attempt at the unit of work.
    async fn try_commit(
        &self,
        caller: i64,
        transfer: &ValidatedTransfer,
        fixed_now: Option<DateTime<Utc>>,
    ) -> Result<SendMoneyResult, AppError> {
        let amount = transfer.amount;
        let mut tx = store::begin_unit(&self.pool, self.config.lock_timeout).await?;

        // Users first, then accounts: one global order for every transfer
        self.accounts
            .lock_users(
                &mut tx,
                &[transfer.sender.user_id, transfer.recipient.user_id],
            )
            .await?;
        let locked = self
            .accounts
            .lock_accounts(&mut tx, &[transfer.sender.id, transfer.recipient.id])
            .await?;

        let sender = locked
            .iter()
            .find(|account| account.id == transfer.sender.id)
            .filter(|account| account.user_id == caller)
            .ok_or(TransferError::Forbidden)?;

        let Some(recipient) = locked
            .iter()
            .find(|account| account.id == transfer.recipient.id)
        else {
            let mut errors = ValidationErrors::default();
            errors.add(RECIPIENT_FIELD, TransferError::InvalidRecipient);
            return Err(AppError::Validation(errors));
        };

        // The user locks above cover the owners seen at validation only
        if recipient.user_id != transfer.recipient.user_id {
            return Err(AppError::Contention);
        }

        // Read after the locks so no committed entry is newer than `now`
        let now = fixed_now.unwrap_or_else(Utc::now);

        let snapshot = self
            .limits
            .snapshot(&mut tx, sender.user_id, recipient.user_id, now)
            .await?;
        self.limits.check(amount, &snapshot)?;

        tracing::debug!(
            sender_account_id = sender.id,
            recipient_account_id = recipient.id,
            outbound_total = snapshot.outbound_total,
            inbound_total = snapshot.inbound_total,
            recent_sends = snapshot.recent_sends,
            "Limits passed"
        );

        let sender_balance = self
            .accounts
            .adjust_balance(&mut tx, sender.id, amount.as_debit())
            .await?;
        let recipient_balance = self
            .accounts
            .adjust_balance(&mut tx, recipient.id, amount.as_credit())
            .await?;

        let (debit, credit) = NewEntry::pair(sender.id, recipient.id, amount, now);
        let pair = self.ledger.append_pair(&mut tx, &debit, &credit).await?;

        tx.commit().await?;

        Ok(SendMoneyResult {
            transaction_id: pair.debit.id,
            credit_transaction_id: pair.credit.id,
            sender_account_id: sender.id,
            recipient_account_id: recipient.id,
            amount_cents: amount.cents(),
            sender_balance_cents: sender_balance,
            recipient_balance_cents: recipient_balance,
            created_at: pair.debit.created_at,
        })
    }
}

/// Linear backoff with jitter so colliding retries spread out
fn backoff(attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..25);
    Duration::from_millis(50 * u64::from(attempt) + jitter)
}
