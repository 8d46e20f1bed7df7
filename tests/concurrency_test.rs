mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{concurrent_test_service, delta, full_history, john_doe, second_handle};
use ledger_service::application::{ApplyRequest, LedgerError};
use ledger_service::domain::TransactionKind;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_are_all_applied() -> Result<()> {
    let (service, _temp) = concurrent_test_service().await?;
    let service = Arc::new(service);
    let customer_id = john_doe(&service, 0).await?.id;

    let mut tasks = JoinSet::new();
    for i in 1..=50 {
        let service = Arc::clone(&service);
        tasks.spawn(async move {
            service
                .apply(ApplyRequest::credit(customer_id, i * 10))
                .await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    // 10 * (1 + 2 + ... + 50)
    assert_eq!(service.get_balance(customer_id).await?, 12750);
    assert_eq!(full_history(&service, customer_id, 7).await?.len(), 50);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_never_overdraw() -> Result<()> {
    let (service, _temp) = concurrent_test_service().await?;
    let service = Arc::new(service);
    let customer_id = john_doe(&service, 1000).await?.id;

    let mut tasks = JoinSet::new();
    for _ in 0..30 {
        let service = Arc::clone(&service);
        tasks.spawn(async move { service.apply(ApplyRequest::debit(customer_id, 100)).await });
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(outcome) => {
                assert!(outcome.balance_cents >= 0);
                succeeded += 1;
            }
            Err(LedgerError::InsufficientBalance { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(rejected, 20);
    assert_eq!(service.get_balance(customer_id).await?, 0);

    let history = full_history(&service, customer_id, 10).await?;
    assert_eq!(history.len(), 10);
    assert!(history.iter().all(|tx| tx.kind == TransactionKind::Debit));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_concurrent_traffic_keeps_balance_consistent() -> Result<()> {
    let (service, _temp) = concurrent_test_service().await?;
    let service = Arc::new(service);
    let customer_id = john_doe(&service, 500).await?.id;

    let mut tasks = JoinSet::new();
    for i in 0..40 {
        let service = Arc::clone(&service);
        let request = if i % 2 == 0 {
            ApplyRequest::credit(customer_id, 300)
        } else {
            ApplyRequest::debit(customer_id, 700)
        };
        tasks.spawn(async move { service.apply(request).await });
    }
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(_) | Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // Replay the journal oldest first: every entry must explain its balance
    let mut history = full_history(&service, customer_id, 8).await?;
    history.reverse();

    let mut running = 500;
    for tx in &history {
        running += delta(tx);
        assert!(running >= 0);
        assert_eq!(tx.balance_after_cents, running);
    }
    assert_eq!(service.get_balance(customer_id).await?, running);

    let sequences: Vec<i64> = history.iter().map(|tx| tx.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_customers_progress_independently() -> Result<()> {
    let (service, _temp) = concurrent_test_service().await?;
    let service = Arc::new(service);

    let mut customers = Vec::new();
    for i in 0..5 {
        customers.push(service.create_account(&format!("Customer {i}"), 0).await?.id);
    }

    let mut tasks = JoinSet::new();
    for &customer_id in &customers {
        for _ in 0..10 {
            let service = Arc::clone(&service);
            tasks.spawn(async move { service.apply(ApplyRequest::credit(customer_id, 100)).await });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    for customer_id in customers {
        assert_eq!(service.get_balance(customer_id).await?, 1000);
        assert_eq!(
            service.list_transactions(customer_id, 1, 10).await?.total_count,
            10
        );
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retries_with_one_key_apply_once() -> Result<()> {
    let (service, _temp) = concurrent_test_service().await?;
    let service = Arc::new(service);
    let customer_id = john_doe(&service, 0).await?.id;

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let service = Arc::clone(&service);
        tasks.spawn(async move {
            service
                .apply(ApplyRequest::credit(customer_id, 2500).with_idempotency_key("payout-7"))
                .await
        });
    }

    let mut fresh = 0;
    let mut ids = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined??;
        if !outcome.replayed {
            fresh += 1;
        }
        ids.push(outcome.transaction.id);
    }

    assert_eq!(fresh, 1);
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(service.get_balance(customer_id).await?, 2500);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_handles_on_one_database_wait_for_each_other() -> Result<()> {
    let (first, temp) = concurrent_test_service().await?;
    let second = second_handle(&temp).await?;
    let handles = [Arc::new(first), Arc::new(second)];
    let customer_id = john_doe(&handles[0], 0).await?.id;

    let mut tasks = JoinSet::new();
    for i in 0..40 {
        let service = Arc::clone(&handles[i % 2]);
        tasks.spawn(async move { service.apply(ApplyRequest::credit(customer_id, 100)).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    for service in &handles {
        assert_eq!(service.get_balance(customer_id).await?, 4000);
    }
    assert_eq!(full_history(&handles[1], customer_id, 10).await?.len(), 40);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_handles_never_overdraw() -> Result<()> {
    let (first, temp) = concurrent_test_service().await?;
    let second = second_handle(&temp).await?;
    let handles = [Arc::new(first), Arc::new(second)];
    let customer_id = john_doe(&handles[0], 1000).await?.id;

    let mut tasks = JoinSet::new();
    for i in 0..20 {
        let service = Arc::clone(&handles[i % 2]);
        tasks.spawn(async move { service.apply(ApplyRequest::debit(customer_id, 100)).await });
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientBalance { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!((succeeded, rejected), (10, 10));
    assert_eq!(handles[1].get_balance(customer_id).await?, 0);

    let mut history = full_history(&handles[0], customer_id, 10).await?;
    history.reverse();
    let mut running = 1000;
    for tx in &history {
        running += delta(tx);
        assert_eq!(tx.balance_after_cents, running);
    }
    assert_eq!(running, 0);

    Ok(())
}
