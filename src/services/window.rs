//! Per-symbol rolling price windows and their storage backends.
//!
//! Windows live in memory by default, so a restart starts every symbol from an
//! empty window: signals stay NEUTRAL until the long window refills. A durable
//! backend only needs to implement [`WindowStore`].

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::error::StoreError;

/// Fixed-capacity, insertion-ordered buffer of the most recent prices.
#[derive(Clone, Debug, PartialEq)]
pub struct RollingWindow {
    prices: VecDeque<Decimal>,
    capacity: usize,
    last_observed: Option<DateTime<Utc>>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            prices: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            last_observed: None,
        }
    }

    pub fn push(&mut self, price: Decimal) {
        self.prices.push_back(price);
        while self.prices.len() > self.capacity {
            self.prices.pop_front();
        }
    }

    /// Pushes an observation unless it is not newer than the last one seen
    /// (a redelivery). Returns whether it was accepted.
    pub fn observe(&mut self, price: Decimal, observed_at: DateTime<Utc>) -> bool {
        if self.last_observed.is_some_and(|last| observed_at <= last) {
            return false;
        }
        self.push(price);
        self.last_observed = Some(observed_at);
        true
    }

    /// Mean of the newest `n` prices, or `None` with fewer than `n` samples
    /// (or if the sum would overflow).
    pub fn average_last(&self, n: usize) -> Option<Decimal> {
        if n == 0 || self.prices.len() < n {
            return None;
        }
        let sum = self
            .prices
            .iter()
            .rev()
            .take(n)
            .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(*p))?;
        sum.checked_div(Decimal::from(n))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_observed(&self) -> Option<DateTime<Utc>> {
        self.last_observed
    }

    /// Oldest first.
    pub fn prices(&self) -> Vec<Decimal> {
        self.prices.iter().copied().collect()
    }
}

/// Storage for rolling windows, keyed by symbol.
#[async_trait]
pub trait WindowStore: Send + Sync {
    async fn load(&self, symbol: &str) -> Result<Option<RollingWindow>, StoreError>;
    async fn save(&self, symbol: &str, window: RollingWindow) -> Result<(), StoreError>;
}

/// Process-local window storage. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryWindowStore {
    windows: DashMap<String, RollingWindow>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbols(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn load(&self, symbol: &str) -> Result<Option<RollingWindow>, StoreError> {
        Ok(self.windows.get(symbol).map(|w| w.clone()))
    }

    async fn save(&self, symbol: &str, window: RollingWindow) -> Result<(), StoreError> {
        self.windows.insert(symbol.to_string(), window);
        Ok(())
    }
}
