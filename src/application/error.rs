use thiserror::Error;

use crate::currency::ConversionError;
use crate::domain::{Cents, CustomerId};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Customer not found: {0}")]
    NotFound(CustomerId),

    #[error("Insufficient balance for customer {customer_id}: balance {balance}, required {requested}")]
    InsufficientBalance {
        customer_id: CustomerId,
        balance: Cents,
        requested: Cents,
    },

    #[error("Currency conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// How a boundary layer should report an error to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ClientError,
    NotFound,
    ServerError,
}

impl LedgerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidInput(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::InvalidInput(_) | LedgerError::InsufficientBalance { .. } => {
                ErrorClass::ClientError
            }
            LedgerError::NotFound(_) => ErrorClass::NotFound,
            LedgerError::Conversion(_) | LedgerError::Internal(_) => ErrorClass::ServerError,
        }
    }
}
