//! Display-time currency conversion.
//!
//! Balances are always stored in [`REFERENCE_CURRENCY`]; converters only change how a
//! balance is presented and never feed back into the ledger.

mod exchange_rate_api;
mod fixed;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::Cents;

pub use exchange_rate_api::*;
pub use fixed::*;

/// The unit every balance and transaction amount is persisted in.
pub const REFERENCE_CURRENCY: Currency = Currency::Usd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }

    pub fn parse(code: &str) -> Result<Self, ConversionError> {
        match code.trim().to_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            _ => Err(ConversionError::UnsupportedCurrency(code.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("no rate available for {from} -> {to}")]
    RateUnavailable { from: Currency, to: Currency },

    #[error("exchange rate request failed: {0}")]
    Request(String),

    #[error("exchange rate API error: {0}")]
    Api(String),
}

/// Converts amounts between currencies for presentation.
#[async_trait]
pub trait CurrencyConverter: Send + Sync {
    /// Convert `amount` (cents of `from`) into cents of `to`.
    async fn convert(
        &self,
        from: Currency,
        to: Currency,
        amount: Cents,
    ) -> Result<Cents, ConversionError>;
}

/// Apply a floating-point rate to a cent amount, rounding to the nearest cent.
pub(crate) fn apply_rate(amount: Cents, rate: f64) -> Result<Cents, ConversionError> {
    let converted = (amount as f64 * rate).round();
    if !converted.is_finite() || converted.abs() >= i64::MAX as f64 {
        return Err(ConversionError::Api(format!("rate {} is out of range", rate)));
    }
    Ok(converted as Cents)
}
