use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::SourceError;

/// Fetches the latest price for a symbol. Implementations never retry.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, symbol: &str) -> Result<Decimal, SourceError>;
}

#[derive(Clone, Debug)]
enum Scripted {
    Price(Decimal),
    RateLimited,
}

/// Scripted price source: each symbol replays its queued responses, then
/// repeats the last price forever.
#[derive(Clone, Default)]
pub struct StaticPriceSource {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Scripted>>>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(symbol: &str, prices: &[Decimal]) -> Self {
        let source = Self::new();
        for p in prices {
            source.push_price(symbol, *p);
        }
        source
    }

    pub fn push_price(&self, symbol: &str, price: Decimal) {
        self.push(symbol, Scripted::Price(price));
    }

    pub fn push_rate_limited(&self, symbol: &str) {
        self.push(symbol, Scripted::RateLimited);
    }

    fn push(&self, symbol: &str, step: Scripted) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(symbol.to_string()).or_default().push_back(step);
        }
    }

    /// How many times `symbol` has been fetched.
    pub fn calls(&self, symbol: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.get(symbol).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self, symbol: &str) -> Result<Decimal, SourceError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(symbol.to_string()).or_insert(0) += 1;
        }
        let step = {
            let mut scripts = self.scripts.lock().map_err(|_| SourceError::NotFound {
                symbol: symbol.to_string(),
            })?;
            let queue = scripts.get_mut(symbol).ok_or_else(|| SourceError::NotFound {
                symbol: symbol.to_string(),
            })?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };
        match step {
            Some(Scripted::Price(p)) => Ok(p),
            Some(Scripted::RateLimited) => Err(SourceError::RateLimited {
                symbol: symbol.to_string(),
                message: "scripted rate limit".to_string(),
            }),
            None => Err(SourceError::NotFound {
                symbol: symbol.to_string(),
            }),
        }
    }
}
