//! Response contracts for boundary layers.
//!
//! Amounts are rendered in major units of their currency and timestamps as RFC 3339
//! with microseconds, the precision the journal is ordered by.
//! Nothing here is persisted.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::currency::{Currency, REFERENCE_CURRENCY};
use crate::domain::{Cents, Customer, CustomerId, Page, Transaction, TransactionId, TransactionKind, cents_to_major};

use super::{ApplyOutcome, DisplayBalance, LedgerError};

fn as_major_units<S: Serializer>(cents: &Cents, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(cents_to_major(*cents))
}

fn as_rfc3339<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

#[derive(Debug, Serialize)]
pub struct CustomerResponse {
    pub customer_id: CustomerId,
    pub name: String,
    #[serde(serialize_with = "as_major_units")]
    pub balance: Cents,
}

impl From<&Customer> for CustomerResponse {
    fn from(customer: &Customer) -> Self {
        Self {
            customer_id: customer.id,
            name: customer.name.clone(),
            balance: customer.balance_cents,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: TransactionId,
    pub status: &'static str,
    #[serde(serialize_with = "as_major_units")]
    pub balance: Cents,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
}

impl From<&ApplyOutcome> for TransactionResponse {
    fn from(outcome: &ApplyOutcome) -> Self {
        Self {
            transaction_id: outcome.transaction.id,
            status: "success",
            balance: outcome.balance_cents,
            replayed: outcome.replayed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub customer_id: CustomerId,
    #[serde(serialize_with = "as_major_units")]
    pub balance: Cents,
    pub currency: Currency,
}

impl BalanceResponse {
    pub fn in_reference_currency(customer_id: CustomerId, balance: Cents) -> Self {
        Self {
            customer_id,
            balance,
            currency: REFERENCE_CURRENCY,
        }
    }
}

impl From<&DisplayBalance> for BalanceResponse {
    fn from(balance: &DisplayBalance) -> Self {
        Self {
            customer_id: balance.customer_id,
            balance: balance.balance_cents,
            currency: balance.currency,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionEntry {
    pub transaction_id: TransactionId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(serialize_with = "as_major_units")]
    pub amount: Cents,
    #[serde(serialize_with = "as_rfc3339")]
    pub timestamp: DateTime<Utc>,
}

impl From<&Transaction> for TransactionEntry {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            kind: tx.kind,
            amount: tx.amount_cents,
            timestamp: tx.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionEntry>,
    pub pagination: Pagination,
}

impl From<&Page<Transaction>> for TransactionListResponse {
    fn from(page: &Page<Transaction>) -> Self {
        Self {
            transactions: page.items.iter().map(TransactionEntry::from).collect(),
            pagination: Pagination {
                total_count: page.total_count,
                page: page.page,
                page_size: page.page_size,
                total_pages: page.total_pages,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&LedgerError> for ErrorResponse {
    fn from(err: &LedgerError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}
