use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::domain::{Customer, CustomerId, Transaction, TransactionKind};

use super::{MIGRATION_001_INITIAL, StoreConfig};

const TRANSACTION_COLUMNS: &str = "id, sequence, customer_id, kind, amount_cents, balance_after_cents, idempotency_key, created_at";

/// Repository for persisting customers and their transaction journal.
///
/// This is the only component that talks to the database. It enforces no business
/// rules beyond the schema constraints; admission checks live in the service.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for the configured database file.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(config.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to database {}",
                    config.database_path.display()
                )
            })?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(config: &StoreConfig) -> Result<Self> {
        let repo = Self::connect(config).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Customer operations
    // ========================

    /// Save a new customer to the database.
    pub async fn save_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, balance_cents, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(customer.id.to_string())
        .bind(&customer.name)
        .bind(customer.balance_cents)
        .bind(format_timestamp(customer.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save customer")?;
        Ok(())
    }

    /// Get a customer by ID.
    pub async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, balance_cents, created_at
            FROM customers
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch customer")?;

        row.as_ref().map(Self::row_to_customer).transpose()
    }

    fn row_to_customer(row: &SqliteRow) -> Result<Customer> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(Customer {
            id: Uuid::parse_str(&id_str).context("Invalid customer ID")?,
            name: row.get("name"),
            balance_cents: row.get("balance_cents"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    // ========================
    // Journal operations
    // ========================

    /// Open a unit of work. Nothing it writes is visible until [`UnitOfWork::commit`];
    /// dropping it rolls back.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin unit of work")?;
        Ok(UnitOfWork { tx })
    }

    /// Read one page of a customer's journal, newest first, together with the total count.
    /// Returns `None` if the customer doesn't exist.
    ///
    /// All three reads share one read transaction so the count and the page describe the
    /// same snapshot.
    pub async fn list_transactions_page(
        &self,
        customer_id: CustomerId,
        offset: u64,
        limit: u32,
    ) -> Result<Option<(Vec<Transaction>, u64)>> {
        let customer_id_str = customer_id.to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin read transaction")?;

        let exists: i64 = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM customers WHERE id = ?) as found",
        )
        .bind(&customer_id_str)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to verify customer")?
        .get("found");

        if exists == 0 {
            return Ok(None);
        }

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) as count FROM transactions WHERE customer_id = ?",
        )
        .bind(&customer_id_str)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to count transactions")?
        .get("count");

        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE customer_id = ?
            ORDER BY created_at DESC, sequence DESC
            LIMIT ? OFFSET ?
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(&customer_id_str)
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await
        .context("Failed to fetch transactions")?;

        tx.commit().await.context("Failed to close read transaction")?;

        let transactions = rows
            .iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some((transactions, total.max(0) as u64)))
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let customer_id_str: String = row.get("customer_id");
        let kind_str: String = row.get("kind");
        let created_at_str: String = row.get("created_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            sequence: row.get("sequence"),
            customer_id: Uuid::parse_str(&customer_id_str).context("Invalid customer ID")?,
            kind: TransactionKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
            amount_cents: row.get("amount_cents"),
            balance_after_cents: row.get("balance_after_cents"),
            idempotency_key: row.get("idempotency_key"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

/// One apply's worth of reads and writes against a single database transaction.
///
/// [`UnitOfWork::lock_customer`] must come first: it takes SQLite's write lock, so every
/// later read sees the latest committed state and no other writer, in this process or
/// another, can commit until this unit of work ends.
pub struct UnitOfWork {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    /// Take the database write lock and read the customer under it.
    /// Returns `None` if the customer doesn't exist.
    ///
    /// The no-op update is the transaction's first statement, so SQLite acquires the
    /// write lock before any snapshot is taken and waits up to the busy timeout for a
    /// concurrent writer to finish.
    pub async fn lock_customer(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        let id_str = id.to_string();

        sqlx::query("UPDATE customers SET balance_cents = balance_cents WHERE id = ?")
            .bind(&id_str)
            .execute(&mut *self.tx)
            .await
            .context("Failed to lock customer")?;

        let row = sqlx::query(
            r#"
            SELECT id, name, balance_cents, created_at
            FROM customers
            WHERE id = ?
            "#,
        )
        .bind(&id_str)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to fetch customer")?;

        row.as_ref().map(Repository::row_to_customer).transpose()
    }

    /// Find the transaction a customer previously submitted under `key`.
    pub async fn find_transaction_by_key(
        &mut self,
        customer_id: CustomerId,
        key: &str,
    ) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE customer_id = ? AND idempotency_key = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(customer_id.to_string())
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to look up idempotency key")?;

        row.as_ref().map(Repository::row_to_transaction).transpose()
    }

    /// Set the customer's balance to `transaction.balance_after_cents` and append
    /// `transaction` to the journal. Assigns the sequence number and commit time.
    pub async fn append_transaction(&mut self, transaction: &mut Transaction) -> Result<()> {
        let updated = sqlx::query("UPDATE customers SET balance_cents = ? WHERE id = ?")
            .bind(transaction.balance_after_cents)
            .bind(transaction.customer_id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to update balance")?
            .rows_affected();

        if updated != 1 {
            anyhow::bail!("Customer {} disappeared mid-transaction", transaction.customer_id);
        }

        transaction.sequence = next_sequence(&mut *self.tx).await?;
        transaction.created_at = next_timestamp(&mut *self.tx, transaction.customer_id).await?;

        sqlx::query(&format!(
            "INSERT INTO transactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            TRANSACTION_COLUMNS
        ))
        .bind(transaction.id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.customer_id.to_string())
        .bind(transaction.kind.as_str())
        .bind(transaction.amount_cents)
        .bind(transaction.balance_after_cents)
        .bind(&transaction.idempotency_key)
        .bind(format_timestamp(transaction.created_at))
        .execute(&mut *self.tx)
        .await
        .context("Failed to append transaction")?;

        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit unit of work")
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back unit of work")
    }
}

/// Get the next sequence number and increment the counter.
async fn next_sequence(conn: &mut SqliteConnection) -> Result<i64> {
    let row = sqlx::query(
        r#"
        UPDATE sequence_counter
        SET value = value + 1
        WHERE name = 'transaction_sequence'
        RETURNING value
        "#,
    )
    .fetch_one(&mut *conn)
    .await
    .context("Failed to get next sequence number")?;

    Ok(row.get("value"))
}

/// Commit time for a customer's next transaction: now, but never earlier than
/// the customer's latest entry, so timestamps stay monotonic per customer.
async fn next_timestamp(
    conn: &mut SqliteConnection,
    customer_id: CustomerId,
) -> Result<DateTime<Utc>> {
    let row = sqlx::query("SELECT MAX(created_at) as latest FROM transactions WHERE customer_id = ?")
        .bind(customer_id.to_string())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to read latest transaction time")?;

    let now = Utc::now().trunc_subsecs(6);
    let latest: Option<String> = row.get("latest");
    match latest {
        Some(s) => Ok(now.max(parse_timestamp(&s)?)),
        None => Ok(now),
    }
}

/// Fixed-width RFC 3339 (microseconds, `Z`), so lexical order matches time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .context("Invalid timestamp")?
        .with_timezone(&Utc))
}
