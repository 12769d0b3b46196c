use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::fetcher::{MAX_PRICE, MAX_SYMBOL_LEN};
use crate::error::DecodeError;

/// Namespace for deterministic idempotency keys derived from event content.
const IDEMPOTENCY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_8b3d_4c7a_9e21_5d0f_b3a8_c914);

/// A single price observation as it travels over the event log.
///
/// Wire format is `{"symbol": "AAPL", "price": 187.25, "time": "<RFC 3339>"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceEvent {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(rename = "time")]
    pub observed_at: DateTime<Utc>,
}

impl PriceEvent {
    /// Builds a validated event.
    pub fn new(
        symbol: impl Into<String>,
        price: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, DecodeError> {
        let event = Self {
            symbol: symbol.into(),
            price,
            observed_at,
        };
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.symbol.is_empty() || self.symbol.chars().count() > MAX_SYMBOL_LEN {
            return Err(DecodeError::InvalidSymbol(self.symbol.clone()));
        }
        if self.price <= Decimal::ZERO || self.price > Decimal::from(MAX_PRICE) {
            return Err(DecodeError::InvalidPrice {
                symbol: self.symbol.clone(),
                price: self.price,
            });
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses and validates a raw log payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload).map_err(|_| DecodeError::Utf8)?;
        let event: PriceEvent = serde_json::from_str(text)?;
        event.validate()?;
        Ok(event)
    }

    /// UTC calendar day the observation belongs to.
    pub fn day(&self) -> NaiveDate {
        self.observed_at.date_naive()
    }
}

/// Deterministic identity of a price record: `(symbol, observedAt)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub symbol: String,
    pub observed_at: DateTime<Utc>,
}

impl EventKey {
    pub fn new(symbol: &str, observed_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            observed_at,
        }
    }
}

/// Idempotency key for one alert: `(symbol, observedAt, thresholdRuleId)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertKey(pub Uuid);

impl AlertKey {
    pub fn derive(event: &PriceEvent, rule_id: u64) -> Self {
        let material = format!(
            "{}|{}.{:09}|{}",
            event.symbol,
            event.observed_at.timestamp(),
            event.observed_at.timestamp_subsec_nanos(),
            rule_id
        );
        AlertKey(Uuid::new_v5(&IDEMPOTENCY_NAMESPACE, material.as_bytes()))
    }
}

/// Trend classification produced by the signal consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl Trend {
    /// Short vs long average comparison. Missing averages never signal.
    pub fn classify(avg_short: Option<Decimal>, avg_long: Option<Decimal>) -> Self {
        match (avg_short, avg_long) {
            (Some(short), Some(long)) if short > long => Trend::Bullish,
            (Some(short), Some(long)) if short < long => Trend::Bearish,
            _ => Trend::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Bullish => "BULLISH",
            Trend::Bearish => "BEARISH",
            Trend::Neutral => "NEUTRAL",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
