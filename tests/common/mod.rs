// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use ledger_service::application::{ApplyRequest, LedgerConfig, LedgerService};
use ledger_service::domain::{Cents, Customer, CustomerId, Page, Transaction, TransactionKind};
use ledger_service::storage::StoreConfig;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tempfile::TempDir;

fn db_path(temp_dir: &TempDir) -> std::path::PathBuf {
    temp_dir.path().join("test.db")
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(db_path(&temp_dir)).await?;
    Ok((service, temp_dir))
}

/// Helper to create a test service sized for many concurrent callers
pub async fn concurrent_test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let store = StoreConfig::new(db_path(&temp_dir))
        .create_if_missing(true)
        .with_max_connections(16);
    let service = LedgerService::init_with(&store, LedgerConfig::default()).await?;
    Ok((service, temp_dir))
}

/// Store settings for the test database
pub fn store_config(temp_dir: &TempDir) -> StoreConfig {
    StoreConfig::new(db_path(temp_dir))
}

/// Another service on the same database file, as a second process would open it
pub async fn second_handle(temp_dir: &TempDir) -> Result<LedgerService> {
    let store = store_config(temp_dir).with_max_connections(16);
    Ok(LedgerService::connect_with(&store, LedgerConfig::default()).await?)
}

/// Plain SQLite pool on the test database, bypassing the ledger
pub async fn raw_pool(temp_dir: &TempDir) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path(temp_dir))
        .journal_mode(SqliteJournalMode::Wal);
    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?)
}

/// Signed effect of a journal entry on the balance
pub fn delta(tx: &Transaction) -> Cents {
    match tx.kind {
        TransactionKind::Credit => tx.amount_cents,
        TransactionKind::Debit => -tx.amount_cents,
    }
}

pub fn is_last_page<T>(page: &Page<T>) -> bool {
    u64::from(page.page) >= page.total_pages
}

/// Create the "John Doe" customer used throughout the scenarios
pub async fn john_doe(service: &LedgerService, balance: Cents) -> Result<Customer> {
    Ok(service.create_account("John Doe", balance).await?)
}

/// Apply `count` credits of 1.00 each
pub async fn credit_many(service: &LedgerService, customer_id: CustomerId, count: usize) -> Result<()> {
    for _ in 0..count {
        service.apply(ApplyRequest::credit(customer_id, 100)).await?;
    }
    Ok(())
}

/// Read a customer's whole journal by walking every page
pub async fn full_history(
    service: &LedgerService,
    customer_id: CustomerId,
    page_size: i64,
) -> Result<Vec<Transaction>> {
    let mut history = Vec::new();
    let mut page = 1;
    loop {
        let current = service
            .list_transactions(customer_id, page, page_size)
            .await?;
        let last = is_last_page(&current);
        history.extend(current.items);
        if last {
            return Ok(history);
        }
        page += 1;
    }
}
