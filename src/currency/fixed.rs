use std::collections::HashMap;

use async_trait::async_trait;

use super::{ConversionError, Currency, CurrencyConverter, apply_rate};
use crate::domain::Cents;

/// Converter backed by an in-process rate table. Useful offline and in tests.
#[derive(Debug, Clone, Default)]
pub struct FixedRateConverter {
    rates: HashMap<(Currency, Currency), f64>,
}

impl FixedRateConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `from -> to` at `rate`; the inverse pair is derived.
    pub fn with_rate(mut self, from: Currency, to: Currency, rate: f64) -> Self {
        self.rates.insert((from, to), rate);
        if rate != 0.0 {
            self.rates.entry((to, from)).or_insert(1.0 / rate);
        }
        self
    }
}

#[async_trait]
impl CurrencyConverter for FixedRateConverter {
    async fn convert(
        &self,
        from: Currency,
        to: Currency,
        amount: Cents,
    ) -> Result<Cents, ConversionError> {
        if from == to {
            return Ok(amount);
        }
        let rate = self
            .rates
            .get(&(from, to))
            .copied()
            .ok_or(ConversionError::RateUnavailable { from, to })?;
        apply_rate(amount, rate)
    }
}
