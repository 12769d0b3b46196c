use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::events::{AlertKey, Trend};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: u64,
    pub user_id: u64,
}

/// A symbol a portfolio watches, with the price that should raise an alert.
/// `id` doubles as the threshold rule id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WatchedStock {
    pub id: u64,
    pub portfolio_id: u64,
    pub symbol: String,
    pub threshold_price: Decimal,
}

impl WatchedStock {
    pub fn is_triggered_by(&self, price: Decimal) -> bool {
        price > Decimal::ZERO && price >= self.threshold_price
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub key: AlertKey,
    pub user_id: u64,
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Per (symbol, UTC day) running aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyAnalytics {
    pub symbol: String,
    pub date: NaiveDate,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub avg_price: Decimal,
    pub sample_count: u64,
}

impl DailyAnalytics {
    pub fn first(symbol: &str, date: NaiveDate, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            date,
            min_price: price,
            max_price: price,
            avg_price: price,
            sample_count: 1,
        }
    }

    /// Folds one more sample in: `avg' = (avg * n + price) / (n + 1)`.
    /// On overflow the row is left untouched.
    pub fn apply(&mut self, price: Decimal) -> Result<(), StoreError> {
        let n = Decimal::from(self.sample_count);
        let avg = self
            .avg_price
            .checked_mul(n)
            .and_then(|total| total.checked_add(price))
            .and_then(|total| total.checked_div(n + Decimal::ONE))
            .ok_or_else(|| {
                StoreError::Constraint(format!(
                    "daily average overflow for {} {} at {}",
                    self.symbol, self.date, price
                ))
            })?;
        self.min_price = self.min_price.min(price);
        self.max_price = self.max_price.max(price);
        // rounding in the division must not push avg outside the observed range
        self.avg_price = avg.clamp(self.min_price, self.max_price);
        self.sample_count += 1;
        Ok(())
    }
}

/// Result of applying a price sample to the daily aggregate.
#[derive(Clone, Debug, PartialEq)]
pub enum DailyOutcome {
    Created(DailyAnalytics),
    Updated(DailyAnalytics),
    Duplicate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub symbol: String,
    /// `None` until enough samples exist for the short average.
    pub avg_short: Option<Decimal>,
    /// `None` until the window is full.
    pub avg_long: Option<Decimal>,
    pub signal: Trend,
    pub generated_at: DateTime<Utc>,
}
