use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{Cents, CustomerId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Increases the customer's balance
    Credit,
    /// Decreases the customer's balance, never below zero
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "credit" => Some(TransactionKind::Credit),
            "debit" => Some(TransactionKind::Debit),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A journal entry recording one applied credit or debit.
/// Transactions are immutable once committed.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Store-assigned, strictly increasing across the journal
    pub sequence: i64,
    pub customer_id: CustomerId,
    pub kind: TransactionKind,
    /// Amount in cents (always positive)
    pub amount_cents: Cents,
    /// Customer balance right after this transaction was applied
    pub balance_after_cents: Cents,
    /// Client-supplied token that makes retries of the same request safe
    pub idempotency_key: Option<String>,
    /// Commit time, assigned by the repository
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction. Sequence number and commit time are assigned by the repository.
    pub fn new(
        customer_id: CustomerId,
        kind: TransactionKind,
        amount_cents: Cents,
        balance_after_cents: Cents,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            customer_id,
            kind,
            amount_cents,
            balance_after_cents,
            idempotency_key: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Returns true if this transaction records the same operation as `kind`/`amount_cents`.
    pub fn matches(&self, kind: TransactionKind, amount_cents: Cents) -> bool {
        self.kind == kind && self.amount_cents == amount_cents
    }
}
