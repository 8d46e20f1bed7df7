use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{Cents, TransactionKind};

pub type CustomerId = Uuid;

/// A customer account holding a single non-negative balance in the reference currency.
#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub balance_cents: Cents,
    pub created_at: DateTime<Utc>,
}

/// Why a transaction cannot be admitted against the current balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceError {
    Insufficient,
    Overflow,
}

impl Customer {
    pub fn new(name: impl Into<String>, balance_cents: Cents) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            balance_cents,
            created_at: Utc::now(),
        }
    }

    /// Balance that applying `kind` for `amount_cents` would leave behind.
    /// Never returns a negative balance.
    pub fn balance_after(
        &self,
        kind: TransactionKind,
        amount_cents: Cents,
    ) -> Result<Cents, BalanceError> {
        match kind {
            TransactionKind::Credit => self
                .balance_cents
                .checked_add(amount_cents)
                .ok_or(BalanceError::Overflow),
            TransactionKind::Debit => {
                if self.balance_cents < amount_cents {
                    Err(BalanceError::Insufficient)
                } else {
                    Ok(self.balance_cents - amount_cents)
                }
            }
        }
    }
}
