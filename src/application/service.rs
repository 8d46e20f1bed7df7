use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::currency::{Currency, CurrencyConverter, REFERENCE_CURRENCY};
use crate::domain::{
    BalanceError, Cents, Customer, CustomerId, Page, PageRequest, Transaction, TransactionKind,
};
use crate::storage::{Repository, StoreConfig};

use super::{CustomerLocks, LedgerError};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Tuning for the ledger engine.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How long an apply may wait for another apply on the same customer
    pub lock_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Application service providing the ledger operations.
/// This is the primary interface for any client (CLI, API, etc.).
pub struct LedgerService {
    repo: Repository,
    locks: CustomerLocks,
    config: LedgerConfig,
}

/// A credit or debit to apply to one customer.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub customer_id: CustomerId,
    pub kind: TransactionKind,
    pub amount_cents: Cents,
    pub idempotency_key: Option<String>,
}

impl ApplyRequest {
    pub fn new(customer_id: CustomerId, kind: TransactionKind, amount_cents: Cents) -> Self {
        Self {
            customer_id,
            kind,
            amount_cents,
            idempotency_key: None,
        }
    }

    pub fn credit(customer_id: CustomerId, amount_cents: Cents) -> Self {
        Self::new(customer_id, TransactionKind::Credit, amount_cents)
    }

    pub fn debit(customer_id: CustomerId, amount_cents: Cents) -> Self {
        Self::new(customer_id, TransactionKind::Debit, amount_cents)
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if self.amount_cents <= 0 {
            return Err(LedgerError::invalid("amount must be greater than zero"));
        }
        if let Some(key) = &self.idempotency_key {
            if key.trim().is_empty() {
                return Err(LedgerError::invalid("idempotency key must not be empty"));
            }
            if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                return Err(LedgerError::invalid(format!(
                    "idempotency key must be at most {} bytes",
                    MAX_IDEMPOTENCY_KEY_LEN
                )));
            }
        }
        Ok(())
    }
}

/// Result of applying a transaction
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub transaction: Transaction,
    /// Customer balance right after the transaction
    pub balance_cents: Cents,
    /// True if an earlier call with the same idempotency key already applied it
    pub replayed: bool,
}

/// A balance expressed in a display currency
#[derive(Debug, Clone)]
pub struct DisplayBalance {
    pub customer_id: CustomerId,
    pub balance_cents: Cents,
    pub currency: Currency,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository, config: LedgerConfig) -> Self {
        Self {
            repo,
            locks: CustomerLocks::new(),
            config,
        }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let store = StoreConfig::new(database_path.as_ref()).create_if_missing(true);
        Self::init_with(&store, LedgerConfig::default()).await
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let store = StoreConfig::new(database_path.as_ref());
        Self::connect_with(&store, LedgerConfig::default()).await
    }

    /// Create (if needed) and migrate the configured database.
    pub async fn init_with(store: &StoreConfig, config: LedgerConfig) -> Result<Self, LedgerError> {
        let repo = Repository::init(store).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to the configured database without migrating it.
    pub async fn connect_with(
        store: &StoreConfig,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        let repo = Repository::connect(store).await?;
        Ok(Self::new(repo, config))
    }

    // ========================
    // Account operations
    // ========================

    /// Open an account with a non-negative starting balance.
    #[instrument(skip(self), err(level = "debug"))]
    pub async fn create_account(
        &self,
        name: &str,
        initial_balance_cents: Cents,
    ) -> Result<Customer, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::invalid("name is required"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(LedgerError::invalid(format!(
                "name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        if initial_balance_cents < 0 {
            return Err(LedgerError::invalid("initial balance must be non-negative"));
        }

        let customer = Customer::new(name, initial_balance_cents);
        self.repo.save_customer(&customer).await?;

        info!(customer_id = %customer.id, balance = customer.balance_cents, "account created");
        Ok(customer)
    }

    /// Get a customer by ID.
    pub async fn get_customer(&self, customer_id: CustomerId) -> Result<Customer, LedgerError> {
        self.repo
            .get_customer(customer_id)
            .await?
            .ok_or(LedgerError::NotFound(customer_id))
    }

    /// Current balance in the reference currency.
    pub async fn get_balance(&self, customer_id: CustomerId) -> Result<Cents, LedgerError> {
        Ok(self.get_customer(customer_id).await?.balance_cents)
    }

    /// Current balance converted for display.
    ///
    /// The balance is read first; the conversion runs afterwards, outside any lock.
    #[instrument(skip(self, converter), err(level = "debug"))]
    pub async fn get_balance_in<C>(
        &self,
        customer_id: CustomerId,
        currency: Currency,
        converter: &C,
    ) -> Result<DisplayBalance, LedgerError>
    where
        C: CurrencyConverter + ?Sized,
    {
        let balance = self.get_balance(customer_id).await?;
        let balance_cents = if currency == REFERENCE_CURRENCY {
            balance
        } else {
            converter
                .convert(REFERENCE_CURRENCY, currency, balance)
                .await?
        };

        Ok(DisplayBalance {
            customer_id,
            balance_cents,
            currency,
        })
    }

    // ========================
    // Ledger operations
    // ========================

    /// Apply a credit or debit and journal it, atomically.
    ///
    /// Applies to the same customer are serialized twice over: in-process by that
    /// customer's lock, and across processes by the database write lock the unit of work
    /// takes before reading the balance. Idempotency lookup, admission check, balance
    /// update and journal append all run inside that one unit of work.
    #[instrument(
        skip_all,
        fields(
            customer_id = %request.customer_id,
            kind = %request.kind,
            amount = request.amount_cents,
        ),
        err(level = "debug")
    )]
    pub async fn apply(&self, request: ApplyRequest) -> Result<ApplyOutcome, LedgerError> {
        request.validate()?;
        let customer_id = request.customer_id;

        let _guard = tokio::time::timeout(self.config.lock_timeout, self.locks.lock(customer_id))
            .await
            .map_err(|_| {
                warn!("timed out waiting for customer lock");
                LedgerError::Internal(anyhow::anyhow!(
                    "timed out after {:?} waiting for customer {}; nothing was applied",
                    self.config.lock_timeout,
                    customer_id
                ))
            })?;

        let mut uow = self.repo.begin().await?;
        let customer = uow
            .lock_customer(customer_id)
            .await?
            .ok_or(LedgerError::NotFound(customer_id))?;

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = uow.find_transaction_by_key(customer_id, key).await? {
                uow.rollback().await?;
                if !existing.matches(request.kind, request.amount_cents) {
                    return Err(LedgerError::invalid(format!(
                        "idempotency key '{}' was already used for a different transaction",
                        key
                    )));
                }
                debug!(transaction_id = %existing.id, "replaying earlier transaction");
                return Ok(ApplyOutcome {
                    balance_cents: existing.balance_after_cents,
                    transaction: existing,
                    replayed: true,
                });
            }
        }

        let new_balance = match customer.balance_after(request.kind, request.amount_cents) {
            Ok(balance) => balance,
            Err(BalanceError::Insufficient) => {
                uow.rollback().await?;
                warn!(balance = customer.balance_cents, "debit rejected: insufficient balance");
                return Err(LedgerError::InsufficientBalance {
                    customer_id,
                    balance: customer.balance_cents,
                    requested: request.amount_cents,
                });
            }
            Err(BalanceError::Overflow) => {
                uow.rollback().await?;
                return Err(LedgerError::invalid("credit would overflow the balance"));
            }
        };

        let mut transaction =
            Transaction::new(customer_id, request.kind, request.amount_cents, new_balance);
        if let Some(key) = request.idempotency_key {
            transaction = transaction.with_idempotency_key(key);
        }

        uow.append_transaction(&mut transaction).await?;
        uow.commit().await?;

        info!(
            transaction_id = %transaction.id,
            sequence = transaction.sequence,
            balance = new_balance,
            "transaction committed"
        );

        Ok(ApplyOutcome {
            transaction,
            balance_cents: new_balance,
            replayed: false,
        })
    }

    // ========================
    // Journal operations
    // ========================

    /// One page of a customer's transactions, most recent first.
    pub async fn list_transactions(
        &self,
        customer_id: CustomerId,
        page: i64,
        page_size: i64,
    ) -> Result<Page<Transaction>, LedgerError> {
        let request =
            PageRequest::new(page, page_size).map_err(|e| LedgerError::invalid(e.to_string()))?;

        let (items, total_count) = self
            .repo
            .list_transactions_page(customer_id, request.offset(), request.page_size())
            .await?
            .ok_or(LedgerError::NotFound(customer_id))?;

        Ok(Page::new(items, total_count, request))
    }
}
