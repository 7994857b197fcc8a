//! Transfer engine tests against a live database
//!
//! Run with: DATABASE_URL=postgres://... cargo test --test transfer_engine

mod common;

use chrono::Duration;
use tokio::task::JoinSet;

use common::{as_user, create_account, create_user, create_user_with_account, db_now, insert_entry};
use ewallet::store::LedgerStore;
use ewallet::validation::{AMOUNT_FIELD, RECIPIENT_FIELD};
use ewallet::{AppError, SendMoneyCommand, TransferEngine, TransferError};

// =========================================================================
// Successful transfers
// =========================================================================

#[tokio::test]
async fn test_transfer_moves_money_and_links_pair() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());

    let (sender_user, sender) = create_user_with_account(&pool, 10_000).await;
    let (_, recipient) = create_user_with_account(&pool, 500).await;

    let result = engine
        .execute(SendMoneyCommand::of(sender, recipient, 2_500), &as_user(sender_user))
        .await
        .unwrap();

    assert_eq!(result.amount_cents, 2_500);
    assert_eq!(result.sender_balance_cents, 7_500);
    assert_eq!(result.recipient_balance_cents, 3_000);
    assert_eq!(common::balance(&pool, sender).await, 7_500);
    assert_eq!(common::balance(&pool, recipient).await, 3_000);
    assert_eq!(common::entry_count(&pool, &[sender, recipient]).await, 2);

    let pair = LedgerStore::new(pool.clone())
        .find_pair(result.transaction_id)
        .await
        .unwrap()
        .expect("pair should exist");

    assert!(pair.is_balanced());
    assert_eq!(pair.debit.id, result.transaction_id);
    assert_eq!(pair.debit.account_id, sender);
    assert_eq!(pair.debit.amount_cents, -2_500);
    assert_eq!(pair.debit.parent_id, None);
    assert_eq!(pair.credit.id, result.credit_transaction_id);
    assert_eq!(pair.credit.account_id, recipient);
    assert_eq!(pair.credit.amount_cents, 2_500);
    assert_eq!(pair.credit.parent_id, Some(pair.debit.id));
}

#[tokio::test]
async fn test_pair_found_from_credit_leg() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());

    let (sender_user, sender) = create_user_with_account(&pool, 1_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;

    let result = engine
        .execute(SendMoneyCommand::of(sender, recipient, 100), &as_user(sender_user))
        .await
        .unwrap();

    let pair = LedgerStore::new(pool.clone())
        .find_pair(result.credit_transaction_id)
        .await
        .unwrap()
        .expect("pair should exist");
    assert_eq!(pair.debit.id, result.transaction_id);
}

#[tokio::test]
async fn test_single_transfer_cap_boundary() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());

    let (sender_user, sender) = create_user_with_account(&pool, 5_000_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    let ctx = as_user(sender_user);

    let over = engine
        .execute(SendMoneyCommand::of(sender, recipient, 2_500_001), &ctx)
        .await;
    match over {
        Err(AppError::Validation(errors)) => {
            assert!(matches!(
                errors.get(AMOUNT_FIELD),
                Some(TransferError::InvalidAmount(_))
            ));
        }
        other => panic!("expected amount validation error, got {other:?}"),
    }

    let at_cap = engine
        .execute(SendMoneyCommand::of(sender, recipient, 2_500_000), &ctx)
        .await
        .unwrap();
    assert_eq!(at_cap.sender_balance_cents, 2_500_000);
    assert_eq!(at_cap.recipient_balance_cents, 2_500_000);
}

// =========================================================================
// Rolling velocity windows
// =========================================================================

#[tokio::test]
async fn test_outbound_window_allows_exact_limit() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let now = db_now();

    let (sender_user, sender) = create_user_with_account(&pool, 10_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    insert_entry(&pool, sender, -2_000_000, now - Duration::hours(3)).await;
    insert_entry(&pool, sender, -499_901, now - Duration::hours(1)).await;
    let ctx = as_user(sender_user);

    for cents in [100, 101, 2_000] {
        let result = engine
            .execute_at(SendMoneyCommand::of(sender, recipient, cents), &ctx, now)
            .await;
        assert!(
            matches!(
                result,
                Err(AppError::Transfer(TransferError::OutboundLimitExceeded { .. }))
            ),
            "{cents} cents should exceed the outbound window"
        );
    }

    engine
        .execute_at(SendMoneyCommand::of(sender, recipient, 99), &ctx, now)
        .await
        .unwrap();

    let result = engine
        .execute_at(SendMoneyCommand::of(sender, recipient, 1), &ctx, now)
        .await;
    assert!(matches!(
        result,
        Err(AppError::Transfer(TransferError::OutboundLimitExceeded {
            window_total: 2_500_000,
            requested: 1,
            ..
        }))
    ));
}

#[tokio::test]
async fn test_entry_at_window_start_is_excluded() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let now = db_now();

    let (sender_user, sender) = create_user_with_account(&pool, 10_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    insert_entry(&pool, sender, -2_499_901, now - Duration::hours(24)).await;

    engine
        .execute_at(
            SendMoneyCommand::of(sender, recipient, 100),
            &as_user(sender_user),
            now,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_entry_inside_window_is_included() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let now = db_now();

    let (sender_user, sender) = create_user_with_account(&pool, 10_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    insert_entry(
        &pool,
        sender,
        -2_499_901,
        now - Duration::hours(24) + Duration::minutes(1),
    )
    .await;

    let result = engine
        .execute_at(
            SendMoneyCommand::of(sender, recipient, 100),
            &as_user(sender_user),
            now,
        )
        .await;
    assert!(matches!(
        result,
        Err(AppError::Transfer(TransferError::OutboundLimitExceeded {
            window_total: 2_499_901,
            ..
        }))
    ));
}

#[tokio::test]
async fn test_later_committed_send_counts_toward_earlier_window() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let t1 = db_now();

    let (sender_user, sender) = create_user_with_account(&pool, 1_000_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    insert_entry(&pool, sender, -2_400_000, t1 - Duration::hours(1)).await;
    let ctx = as_user(sender_user);

    engine
        .execute_at(
            SendMoneyCommand::of(sender, recipient, 100_000),
            &ctx,
            t1 + Duration::milliseconds(300),
        )
        .await
        .unwrap();

    let result = engine
        .execute_at(SendMoneyCommand::of(sender, recipient, 100_000), &ctx, t1)
        .await;
    assert!(matches!(
        result,
        Err(AppError::Transfer(TransferError::OutboundLimitExceeded {
            window_total: 2_500_000,
            ..
        }))
    ));
    assert_eq!(common::balance(&pool, sender).await, 900_000);
}

#[tokio::test]
async fn test_later_committed_credit_counts_toward_inbound_window() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let t1 = db_now();

    let (first_user, first) = create_user_with_account(&pool, 1_000_000).await;
    let (second_user, second) = create_user_with_account(&pool, 1_000_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    insert_entry(&pool, recipient, 2_400_000, t1 - Duration::hours(1)).await;

    engine
        .execute_at(
            SendMoneyCommand::of(first, recipient, 100_000),
            &as_user(first_user),
            t1 + Duration::milliseconds(300),
        )
        .await
        .unwrap();

    let result = engine
        .execute_at(
            SendMoneyCommand::of(second, recipient, 100_000),
            &as_user(second_user),
            t1,
        )
        .await;
    assert!(matches!(
        result,
        Err(AppError::Transfer(TransferError::InboundLimitExceeded { .. }))
    ));
}

#[tokio::test]
async fn test_inbound_window_limits_recipient() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let now = db_now();

    let (sender_user, sender) = create_user_with_account(&pool, 10_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    insert_entry(&pool, recipient, 2_499_901, now - Duration::hours(2)).await;
    let ctx = as_user(sender_user);

    let result = engine
        .execute_at(SendMoneyCommand::of(sender, recipient, 100), &ctx, now)
        .await;
    assert!(matches!(
        result,
        Err(AppError::Transfer(TransferError::InboundLimitExceeded { .. }))
    ));

    engine
        .execute_at(SendMoneyCommand::of(sender, recipient, 99), &ctx, now)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_outbound_reported_before_inbound() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let now = db_now();

    let (sender_user, sender) = create_user_with_account(&pool, 10_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    insert_entry(&pool, sender, -2_500_000, now - Duration::hours(1)).await;
    insert_entry(&pool, recipient, 2_500_000, now - Duration::hours(1)).await;

    let result = engine
        .execute_at(
            SendMoneyCommand::of(sender, recipient, 1),
            &as_user(sender_user),
            now,
        )
        .await;
    assert!(matches!(
        result,
        Err(AppError::Transfer(TransferError::OutboundLimitExceeded { .. }))
    ));
}

#[tokio::test]
async fn test_velocity_aggregates_sibling_accounts() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let now = db_now();

    let sender_user = create_user(&pool).await;
    let sender = create_account(&pool, sender_user, 10_000).await;
    let sibling = create_account(&pool, sender_user, 0).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;

    // Another user's history never counts toward this sender
    let (_, stranger) = create_user_with_account(&pool, 0).await;
    insert_entry(&pool, stranger, -2_500_000, now - Duration::hours(1)).await;

    insert_entry(&pool, sibling, -2_499_901, now - Duration::hours(1)).await;
    let ctx = as_user(sender_user);

    let result = engine
        .execute_at(SendMoneyCommand::of(sender, recipient, 100), &ctx, now)
        .await;
    assert!(matches!(
        result,
        Err(AppError::Transfer(TransferError::OutboundLimitExceeded {
            window_total: 2_499_901,
            ..
        }))
    ));

    engine
        .execute_at(SendMoneyCommand::of(sender, recipient, 99), &ctx, now)
        .await
        .unwrap();
}

// =========================================================================
// Hourly send rate
// =========================================================================

#[tokio::test]
async fn test_sixth_send_in_an_hour_is_rate_limited() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let now = db_now();

    let (sender_user, sender) = create_user_with_account(&pool, 10_000).await;
    let (other_user, other) = create_user_with_account(&pool, 10_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    let ctx = as_user(sender_user);

    for minute in 0..5 {
        engine
            .execute_at(
                SendMoneyCommand::of(sender, recipient, 100),
                &ctx,
                now - Duration::minutes(50 - minute * 10),
            )
            .await
            .unwrap();
    }

    let before = common::money_state(&pool, &[sender, recipient]).await;
    let result = engine
        .execute_at(SendMoneyCommand::of(sender, recipient, 100), &ctx, now)
        .await;
    assert!(matches!(
        result,
        Err(AppError::Transfer(TransferError::RateLimited {
            recent_sends: 5,
            limit: 5,
        }))
    ));
    assert_eq!(common::money_state(&pool, &[sender, recipient]).await, before);

    // A different user in the same window is unaffected
    engine
        .execute_at(SendMoneyCommand::of(other, recipient, 100), &as_user(other_user), now)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_later_committed_sends_count_toward_earlier_rate_window() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let t1 = db_now();

    let (sender_user, sender) = create_user_with_account(&pool, 10_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    let ctx = as_user(sender_user);

    for _ in 0..5 {
        engine
            .execute_at(
                SendMoneyCommand::of(sender, recipient, 100),
                &ctx,
                t1 + Duration::milliseconds(300),
            )
            .await
            .unwrap();
    }

    let result = engine
        .execute_at(SendMoneyCommand::of(sender, recipient, 100), &ctx, t1)
        .await;
    assert!(matches!(
        result,
        Err(AppError::Transfer(TransferError::RateLimited {
            recent_sends: 5,
            ..
        }))
    ));
}

#[tokio::test]
async fn test_sends_older_than_an_hour_are_not_counted() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let now = db_now();

    let (sender_user, sender) = create_user_with_account(&pool, 10_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    let ctx = as_user(sender_user);

    for _ in 0..5 {
        engine
            .execute_at(
                SendMoneyCommand::of(sender, recipient, 100),
                &ctx,
                now - Duration::hours(1),
            )
            .await
            .unwrap();
    }

    engine
        .execute_at(SendMoneyCommand::of(sender, recipient, 100), &ctx, now)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_sends_do_not_count_toward_rate() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let now = db_now();

    let (sender_user, sender) = create_user_with_account(&pool, 500).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    let ctx = as_user(sender_user);

    for _ in 0..6 {
        let result = engine
            .execute_at(SendMoneyCommand::of(sender, recipient, 1_000), &ctx, now)
            .await;
        assert!(matches!(
            result,
            Err(AppError::Transfer(TransferError::InsufficientFunds { .. }))
        ));
    }

    engine
        .execute_at(SendMoneyCommand::of(sender, recipient, 100), &ctx, now)
        .await
        .unwrap();
}

// =========================================================================
// Rejections
// =========================================================================

#[tokio::test]
async fn test_self_transfer_rejected() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());

    let (user, account) = create_user_with_account(&pool, 10_000).await;

    for cents in [1, 100, 2_500_000] {
        let result = engine
            .execute(SendMoneyCommand::of(account, account, cents), &as_user(user))
            .await;
        match result {
            Err(AppError::Validation(errors)) => {
                assert_eq!(errors.get(RECIPIENT_FIELD), Some(&TransferError::SelfTransfer));
            }
            other => panic!("expected self-transfer rejection, got {other:?}"),
        }
    }

    assert_eq!(common::balance(&pool, account).await, 10_000);
    assert_eq!(common::entry_count(&pool, &[account]).await, 0);
}

#[tokio::test]
async fn test_insufficient_funds_changes_nothing() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());

    let (sender_user, sender) = create_user_with_account(&pool, 1_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;

    let result = engine
        .execute(SendMoneyCommand::of(sender, recipient, 2_000), &as_user(sender_user))
        .await;
    assert!(matches!(
        result,
        Err(AppError::Transfer(TransferError::InsufficientFunds {
            required: 2_000,
            available: 1_000,
        }))
    ));

    assert_eq!(common::balance(&pool, sender).await, 1_000);
    assert_eq!(common::balance(&pool, recipient).await, 0);
    assert_eq!(common::entry_count(&pool, &[sender, recipient]).await, 0);
}

#[tokio::test]
async fn test_foreign_or_missing_sender_is_forbidden() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());

    let (_, owner_account) = create_user_with_account(&pool, 10_000).await;
    let (intruder, _) = create_user_with_account(&pool, 10_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;

    for sender in [owner_account, i64::MAX] {
        let result = engine
            .execute(SendMoneyCommand::of(sender, recipient, 100), &as_user(intruder))
            .await;
        assert!(
            matches!(result, Err(AppError::Transfer(TransferError::Forbidden))),
            "sender {sender}"
        );
    }

    assert_eq!(common::balance(&pool, owner_account).await, 10_000);
}

#[tokio::test]
async fn test_unknown_recipient_is_field_error() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());

    let (user, sender) = create_user_with_account(&pool, 10_000).await;

    let result = engine
        .execute(SendMoneyCommand::of(sender, i64::MAX, 100), &as_user(user))
        .await;
    match result {
        Err(AppError::Validation(errors)) => {
            assert_eq!(errors.get(RECIPIENT_FIELD), Some(&TransferError::InvalidRecipient));
            assert!(!errors.has(AMOUNT_FIELD));
        }
        other => panic!("expected recipient validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejections_leave_state_unchanged() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());
    let now = db_now();

    let (sender_user, sender) = create_user_with_account(&pool, 1_000).await;
    let (_, recipient) = create_user_with_account(&pool, 0).await;
    insert_entry(&pool, recipient, 2_499_950, now - Duration::hours(1)).await;
    let ctx = as_user(sender_user);

    let before = common::money_state(&pool, &[sender, recipient]).await;

    let rejected = [
        SendMoneyCommand::of(sender, sender, 100),
        SendMoneyCommand::of(sender, recipient, 0),
        SendMoneyCommand::of(sender, recipient, 2_500_001),
        SendMoneyCommand::of(sender, recipient, 5_000),
        SendMoneyCommand::of(sender, recipient, 100),
    ];
    for command in rejected {
        assert!(engine.execute_at(command, &ctx, now).await.is_err());
    }

    assert_eq!(common::money_state(&pool, &[sender, recipient]).await, before);
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_never_overdraw() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());

    let (sender_user, sender) = create_user_with_account(&pool, 300).await;
    let mut recipients = Vec::new();
    for _ in 0..6 {
        recipients.push(create_user_with_account(&pool, 0).await.1);
    }

    let mut tasks = JoinSet::new();
    for recipient in recipients.iter().copied() {
        let engine = engine.clone();
        tasks.spawn(async move {
            engine
                .execute(SendMoneyCommand::of(sender, recipient, 100), &as_user(sender_user))
                .await
        });
    }

    let mut committed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => committed += 1,
            Err(AppError::Transfer(TransferError::InsufficientFunds { .. })) => {}
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }

    assert_eq!(committed, 3);
    assert_eq!(common::balance(&pool, sender).await, 0);

    let mut received = 0;
    for recipient in &recipients {
        received += common::balance(&pool, *recipient).await;
    }
    assert_eq!(received, 300);
    assert_eq!(common::entry_count(&pool, &[sender]).await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_directions_do_not_deadlock() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());

    let (user_a, account_a) = create_user_with_account(&pool, 10_000).await;
    let (user_b, account_b) = create_user_with_account(&pool, 10_000).await;

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let engine = engine.clone();
        let (from, to, owner) = if i % 2 == 0 {
            (account_a, account_b, user_a)
        } else {
            (account_b, account_a, user_b)
        };
        tasks.spawn(async move {
            engine
                .execute(SendMoneyCommand::of(from, to, 100 + i), &as_user(owner))
                .await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    let total = common::balance(&pool, account_a).await + common::balance(&pool, account_b).await;
    assert_eq!(total, 20_000);
    assert_eq!(common::entry_count(&pool, &[account_a, account_b]).await, 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sibling_accounts_cannot_race_past_outbound_limit() {
    let Some(pool) = common::setup_test_db().await else { return };
    let engine = TransferEngine::new(pool.clone());

    let user = create_user(&pool).await;
    let first = create_account(&pool, user, 2_000_000).await;
    let second = create_account(&pool, user, 2_000_000).await;
    let (_, recipient_a) = create_user_with_account(&pool, 0).await;
    let (_, recipient_b) = create_user_with_account(&pool, 0).await;

    let mut tasks = JoinSet::new();
    for (from, to) in [(first, recipient_a), (second, recipient_b)] {
        let engine = engine.clone();
        tasks.spawn(async move {
            engine
                .execute(SendMoneyCommand::of(from, to, 1_500_000), &as_user(user))
                .await
        });
    }

    let mut committed = 0;
    let mut over_limit = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => committed += 1,
            Err(AppError::Transfer(TransferError::OutboundLimitExceeded { .. })) => over_limit += 1,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }

    assert_eq!((committed, over_limit), (1, 1));
    assert_eq!(
        common::balance(&pool, first).await + common::balance(&pool, second).await,
        2_500_000
    );
}
