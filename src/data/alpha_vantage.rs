use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::source::PriceSource;
use crate::config::PriceSourceConfig;
use crate::error::{ConfigError, SourceError};

#[derive(Deserialize, Debug, Default)]
pub struct GlobalQuote {
    #[serde(rename = "01. symbol", default)]
    pub symbol: String,
    #[serde(rename = "05. price", default)]
    pub price: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct QuoteResponse {
    #[serde(rename = "Global Quote", default)]
    pub quote: GlobalQuote,
    /// Present when the free-tier quota is exhausted
    #[serde(rename = "Note")]
    pub note: Option<String>,
    #[serde(rename = "Information")]
    pub information: Option<String>,
}

impl QuoteResponse {
    pub fn into_price(self, symbol: &str) -> Result<Decimal, SourceError> {
        if let Some(message) = self.note.or(self.information) {
            return Err(SourceError::RateLimited {
                symbol: symbol.to_string(),
                message,
            });
        }
        let raw = self.quote.price.trim();
        if raw.is_empty() {
            return Err(SourceError::EmptyQuote {
                symbol: symbol.to_string(),
            });
        }
        Decimal::from_str(raw).map_err(|_| SourceError::Parse {
            symbol: symbol.to_string(),
            raw: raw.to_string(),
        })
    }
}

/// `GLOBAL_QUOTE` client for the Alpha Vantage API.
#[derive(Clone)]
pub struct AlphaVantageSource {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantageSource {
    pub fn new(config: &PriceSourceConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("ALPHA_VANTAGE_API_KEY"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "price_source",
                value: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl PriceSource for AlphaVantageSource {
    fn name(&self) -> &'static str {
        "alpha_vantage"
    }

    async fn fetch(&self, symbol: &str) -> Result<Decimal, SourceError> {
        let url = format!("{}/query", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                symbol: symbol.to_string(),
            });
        }

        let body: QuoteResponse = resp.json().await?;
        debug!("quote response for {}: {:?}", symbol, body);
        body.into_price(symbol)
    }
}
