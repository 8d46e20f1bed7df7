use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use super::{ConversionError, Currency, CurrencyConverter};
use crate::domain::{Cents, format_cents};

pub const DEFAULT_EXCHANGE_API_URL: &str = "https://v6.exchangerate-api.com/v6";
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct PairResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    conversion_result: Option<f64>,
}

/// Converter backed by the exchangerate-api.com v6 "pair" endpoint.
pub struct ExchangeRateApiConverter {
    base_url: String,
    api_key: String,
    client: Client,
}

impl ExchangeRateApiConverter {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConversionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConversionError::Request(format!("failed to build client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    fn pair_url(&self, from: Currency, to: Currency, amount: Cents) -> String {
        format!(
            "{}/{}/pair/{}/{}/{}",
            self.base_url,
            self.api_key,
            from.code(),
            to.code(),
            format_cents(amount)
        )
    }
}

/// Turn a decoded pair response into cents of the target currency.
fn decode_pair_response(response: PairResponse) -> Result<Cents, ConversionError> {
    if response.result != "success" {
        return Err(ConversionError::Api(
            response.error_type.unwrap_or(response.result),
        ));
    }
    let major = response
        .conversion_result
        .ok_or_else(|| ConversionError::Api("missing conversion_result".to_string()))?;
    // Major units back to cents.
    super::apply_rate(100, major)
}

#[async_trait]
impl CurrencyConverter for ExchangeRateApiConverter {
    async fn convert(
        &self,
        from: Currency,
        to: Currency,
        amount: Cents,
    ) -> Result<Cents, ConversionError> {
        if from == to {
            return Ok(amount);
        }

        debug!(%from, %to, amount, "requesting exchange rate");
        let response = self
            .client
            .get(self.pair_url(from, to, amount))
            .send()
            .await
            .map_err(|e| {
                // The URL carries the API key.
                let e = e.without_url();
                error!("Exchange rate request failed: {}", e);
                ConversionError::Request(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(ConversionError::Api(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let body = response
            .json::<PairResponse>()
            .await
            .map_err(|e| ConversionError::Request(format!("failed to decode response: {}", e)))?;

        decode_pair_response(body)
    }
}
