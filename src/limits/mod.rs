//! Transfer limits
//!
//! Stateless policy layer. Three independent limiters are composed here:
//! the single-transfer cap, the rolling 24h velocity limits (outbound for
//! the sender's user, inbound for the recipient's user) and the hourly send
//! count. Velocity and rate inputs are read from the ledger on the caller's
//! unit of work, under the owning users' locks.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Postgres, Transaction};

use crate::domain::{AmountCents, TransferError};
use crate::store::{Direction, LedgerStore, StoreError};

/// Largest amount a single transfer may move ($25,000.00)
pub const SINGLE_TRANSFER_CAP_CENTS: i64 = 2_500_000;

/// Rolling 24h volume a user may send across all its accounts
pub const DAILY_OUTBOUND_LIMIT_CENTS: i64 = 2_500_000;

/// Rolling 24h volume a user may receive across all its accounts
pub const DAILY_INBOUND_LIMIT_CENTS: i64 = 2_500_000;

/// Sends a user may make per trailing hour
pub const HOURLY_SEND_LIMIT: i64 = 5;

/// Limit values applied by [`LimitEnforcer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub per_transfer_cap_cents: i64,
    pub daily_outbound_cents: i64,
    pub daily_inbound_cents: i64,
    pub hourly_sends: i64,
    pub velocity_window: Duration,
    pub rate_window: Duration,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            per_transfer_cap_cents: SINGLE_TRANSFER_CAP_CENTS,
            daily_outbound_cents: DAILY_OUTBOUND_LIMIT_CENTS,
            daily_inbound_cents: DAILY_INBOUND_LIMIT_CENTS,
            hourly_sends: HOURLY_SEND_LIMIT,
            velocity_window: Duration::hours(24),
            rate_window: Duration::hours(1),
        }
    }
}

/// Ledger aggregates a transfer is checked against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitSnapshot {
    /// Absolute debit volume of the sender's user in the velocity window
    pub outbound_total: i64,
    /// Credit volume of the recipient's user in the velocity window
    pub inbound_total: i64,
    /// Committed sends of the sender's user in the rate window
    pub recent_sends: i64,
}

impl LimitSnapshot {
    /// Build from signed ledger sums. The outbound sum is negative.
    pub fn from_sums(outbound_sum: i64, inbound_sum: i64, recent_sends: i64) -> Self {
        Self {
            outbound_total: outbound_sum.saturating_abs(),
            inbound_total: inbound_sum,
            recent_sends,
        }
    }
}

/// Evaluates every limiter for one transfer
#[derive(Debug, Clone)]
pub struct LimitEnforcer {
    ledger: LedgerStore,
    limits: TransferLimits,
}

impl LimitEnforcer {
    pub fn new(ledger: LedgerStore, limits: TransferLimits) -> Self {
        Self { ledger, limits }
    }

    /// Read the velocity and rate windows as of `now`.
    ///
    /// A window covers every entry created after `now - window`. An entry
    /// created exactly one window ago is outside; nothing newer is.
    pub async fn snapshot(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sender_user_id: i64,
        recipient_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<LimitSnapshot, StoreError> {
        let velocity_since = now - self.limits.velocity_window;
        let rate_since = now - self.limits.rate_window;

        let outbound = self
            .ledger
            .sum_window(tx, sender_user_id, Direction::Outbound, velocity_since)
            .await?;
        let inbound = self
            .ledger
            .sum_window(tx, recipient_user_id, Direction::Inbound, velocity_since)
            .await?;
        let recent_sends = self
            .ledger
            .count_sends(tx, sender_user_id, rate_since)
            .await?;

        Ok(LimitSnapshot::from_sums(outbound, inbound, recent_sends))
    }

    /// Every limiter the transfer trips, in priority order: cap, outbound,
    /// inbound, rate.
    pub fn violations(&self, amount: AmountCents, snapshot: &LimitSnapshot) -> Vec<TransferError> {
        [
            check_single_cap(&self.limits, amount),
            check_outbound(&self.limits, amount, snapshot.outbound_total),
            check_inbound(&self.limits, amount, snapshot.inbound_total),
            check_rate(&self.limits, snapshot.recent_sends),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect()
    }

    /// First violation by priority, if any
    pub fn check(&self, amount: AmountCents, snapshot: &LimitSnapshot) -> Result<(), TransferError> {
        match self.violations(amount, snapshot).into_iter().next() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }
}

/// Stateless bound on a single amount.
pub fn check_single_cap(limits: &TransferLimits, amount: AmountCents) -> Result<(), TransferError> {
    if amount.cents() > limits.per_transfer_cap_cents {
        return Err(TransferError::InvalidAmount(format!(
            "must not exceed {} cents",
            limits.per_transfer_cap_cents
        )));
    }
    Ok(())
}

pub fn check_outbound(
    limits: &TransferLimits,
    amount: AmountCents,
    window_total: i64,
) -> Result<(), TransferError> {
    if exceeds(window_total, amount, limits.daily_outbound_cents) {
        return Err(TransferError::OutboundLimitExceeded {
            window_total,
            requested: amount.cents(),
            limit: limits.daily_outbound_cents,
        });
    }
    Ok(())
}

pub fn check_inbound(
    limits: &TransferLimits,
    amount: AmountCents,
    window_total: i64,
) -> Result<(), TransferError> {
    if exceeds(window_total, amount, limits.daily_inbound_cents) {
        return Err(TransferError::InboundLimitExceeded {
            window_total,
            requested: amount.cents(),
            limit: limits.daily_inbound_cents,
        });
    }
    Ok(())
}

/// Rejects once `hourly_sends` sends already exist in the window.
pub fn check_rate(limits: &TransferLimits, recent_sends: i64) -> Result<(), TransferError> {
    if recent_sends >= limits.hourly_sends {
        return Err(TransferError::RateLimited {
            recent_sends,
            limit: limits.hourly_sends,
        });
    }
    Ok(())
}

fn exceeds(window_total: i64, amount: AmountCents, limit: i64) -> bool {
    window_total
        .checked_add(amount.cents())
        .map_or(true, |total| total > limit)
}
