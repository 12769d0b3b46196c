use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::models::{
    Alert, DailyAnalytics, DailyOutcome, Portfolio, PriceRecord, SignalRecord, WatchedStock,
};
use crate::error::StoreError;
use crate::events::{AlertKey, EventKey, PriceEvent};

/// Durable store the pipeline writes into. Every method is atomic per row.
#[async_trait]
pub trait Store: Send + Sync {
    async fn watched_stocks(&self) -> Result<Vec<WatchedStock>, StoreError>;
    async fn watched_stocks_for(&self, symbol: &str) -> Result<Vec<WatchedStock>, StoreError>;
    async fn portfolio(&self, id: u64) -> Result<Option<Portfolio>, StoreError>;

    /// Inserts unless an alert with the same key exists. Returns whether it was inserted.
    async fn insert_alert(&self, alert: Alert) -> Result<bool, StoreError>;

    /// Inserts unless a record for the same `(symbol, timestamp)` exists.
    async fn insert_price_record(&self, record: PriceRecord) -> Result<bool, StoreError>;

    /// Find-or-create the `(symbol, day)` row and fold the price in, recording the
    /// event key in the same step so a redelivered event is not counted twice.
    async fn apply_daily_sample(&self, event: &PriceEvent) -> Result<DailyOutcome, StoreError>;

    async fn daily(&self, symbol: &str, date: NaiveDate)
        -> Result<Option<DailyAnalytics>, StoreError>;

    async fn append_signal(&self, record: SignalRecord) -> Result<(), StoreError>;

    /// Drops the daily dedup keys of days before `cutoff`; rows are kept.
    /// A redelivery for a compacted day is counted again, so `cutoff` must
    /// lie beyond the log's redelivery horizon. Returns the keys dropped.
    async fn compact_daily_before(&self, cutoff: NaiveDate) -> Result<usize, StoreError>;
}

/// A daily row plus the observation times already folded into it.
struct DailyEntry {
    row: DailyAnalytics,
    applied: HashSet<DateTime<Utc>>,
}

#[derive(Default)]
struct DailyTable {
    rows: HashMap<(String, NaiveDate), DailyEntry>,
}

/// In-memory [`Store`] used by tests and single-process runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    portfolios: Arc<Mutex<HashMap<u64, Portfolio>>>,
    watched: Arc<Mutex<Vec<WatchedStock>>>,
    alerts: Arc<Mutex<Vec<Alert>>>,
    alert_keys: Arc<Mutex<HashSet<AlertKey>>>,
    prices: Arc<Mutex<Vec<PriceRecord>>>,
    price_keys: Arc<Mutex<HashSet<EventKey>>>,
    daily: Arc<Mutex<DailyTable>>,
    signals: Arc<Mutex<Vec<SignalRecord>>>,
    next_id: Arc<AtomicU64>,
    pending_failures: Arc<AtomicUsize>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    m.lock()
        .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_portfolio(&self, user_id: u64) -> Result<Portfolio, StoreError> {
        let portfolio = Portfolio {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id,
        };
        lock(&self.portfolios)?.insert(portfolio.id, portfolio.clone());
        Ok(portfolio)
    }

    pub fn remove_portfolio(&self, id: u64) -> Result<Option<Portfolio>, StoreError> {
        Ok(lock(&self.portfolios)?.remove(&id))
    }

    pub fn add_watched_stock(
        &self,
        portfolio_id: u64,
        symbol: &str,
        threshold_price: rust_decimal::Decimal,
    ) -> Result<WatchedStock, StoreError> {
        let stock = WatchedStock {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            portfolio_id,
            symbol: symbol.to_string(),
            threshold_price,
        };
        lock(&self.watched)?.push(stock.clone());
        Ok(stock)
    }

    /// Makes the next `n` write operations fail as if the store were unreachable.
    pub fn fail_next_writes(&self, n: usize) {
        self.pending_failures.fetch_add(n, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        let took = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn price_records(&self) -> Vec<PriceRecord> {
        self.prices.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn signals(&self) -> Vec<SignalRecord> {
        self.signals.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn signals_for(&self, symbol: &str) -> Vec<SignalRecord> {
        self.signals()
            .into_iter()
            .filter(|s| s.symbol == symbol)
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn watched_stocks(&self) -> Result<Vec<WatchedStock>, StoreError> {
        Ok(lock(&self.watched)?.clone())
    }

    async fn watched_stocks_for(&self, symbol: &str) -> Result<Vec<WatchedStock>, StoreError> {
        Ok(lock(&self.watched)?
            .iter()
            .filter(|w| w.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn portfolio(&self, id: u64) -> Result<Option<Portfolio>, StoreError> {
        Ok(lock(&self.portfolios)?.get(&id).cloned())
    }

    async fn insert_alert(&self, alert: Alert) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut keys = lock(&self.alert_keys)?;
        if !keys.insert(alert.key) {
            return Ok(false);
        }
        lock(&self.alerts)?.push(alert);
        Ok(true)
    }

    async fn insert_price_record(&self, record: PriceRecord) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut keys = lock(&self.price_keys)?;
        if !keys.insert(EventKey::new(&record.symbol, record.timestamp)) {
            return Ok(false);
        }
        lock(&self.prices)?.push(record);
        Ok(true)
    }

    async fn apply_daily_sample(&self, event: &PriceEvent) -> Result<DailyOutcome, StoreError> {
        self.check_available()?;
        let mut table = lock(&self.daily)?;
        let row_key = (event.symbol.clone(), event.day());
        match table.rows.get_mut(&row_key) {
            Some(entry) => {
                if entry.applied.contains(&event.observed_at) {
                    return Ok(DailyOutcome::Duplicate);
                }
                entry.row.apply(event.price)?;
                entry.applied.insert(event.observed_at);
                Ok(DailyOutcome::Updated(entry.row.clone()))
            }
            None => {
                let row = DailyAnalytics::first(&event.symbol, event.day(), event.price);
                let entry = DailyEntry {
                    row: row.clone(),
                    applied: HashSet::from([event.observed_at]),
                };
                table.rows.insert(row_key, entry);
                Ok(DailyOutcome::Created(row))
            }
        }
    }

    async fn daily(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyAnalytics>, StoreError> {
        Ok(lock(&self.daily)?
            .rows
            .get(&(symbol.to_string(), date))
            .map(|entry| entry.row.clone()))
    }

    async fn append_signal(&self, record: SignalRecord) -> Result<(), StoreError> {
        self.check_available()?;
        lock(&self.signals)?.push(record);
        Ok(())
    }

    async fn compact_daily_before(&self, cutoff: NaiveDate) -> Result<usize, StoreError> {
        let mut table = lock(&self.daily)?;
        let mut dropped = 0;
        for ((_, date), entry) in table.rows.iter_mut() {
            if *date < cutoff {
                dropped += entry.applied.len();
                entry.applied = HashSet::new();
            }
        }
        Ok(dropped)
    }
}
