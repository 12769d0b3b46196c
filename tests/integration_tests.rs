//! Integration tests for the price pipeline.
//! These tests run the fetcher and all consumers together on the in-memory log.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use stock_pulse::bus::{EventBus, EventLog, MemoryEventLog};
use stock_pulse::config::{AppConfig, BackoffConfig, Role};
use stock_pulse::data::store::Store;
use stock_pulse::data::{MemoryStore, StaticPriceSource};
use stock_pulse::error::StoreError;
use stock_pulse::events::{PriceEvent, Trend};
use stock_pulse::pipeline::Pipeline;
use stock_pulse::services::window::{MemoryWindowStore, RollingWindow, WindowStore};

const TOPIC: &str = "stock_prices";

fn config(roles: Vec<Role>) -> AppConfig {
    let mut config = AppConfig::default();
    config.roles = roles;
    config.fetcher.interval_secs = 1;
    config.shutdown_grace_secs = 1;
    config.backoff = BackoffConfig {
        initial_delay_ms: 1,
        max_delay_ms: 10,
        multiplier: 2.0,
        jitter: 0.0,
    };
    config
}

fn bus(log: &MemoryEventLog) -> EventBus {
    EventBus::new(Arc::new(log.clone()), TOPIC, Duration::from_secs(1))
}

async fn wait_until<F: Fn() -> bool>(check: F) {
    for _ in 0..1000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pipeline did not reach expected state");
}

fn all_caught_up(log: &MemoryEventLog, config: &AppConfig) -> bool {
    let g = &config.groups;
    [&g.alert, &g.persistence, &g.daily_analytics, &g.signal_analytics]
        .iter()
        .all(|group| log.lag(TOPIC, group) == 0)
}

/// Fetcher -> log -> all four consumers, driven by a scripted price source.
#[tokio::test(start_paused = true)]
async fn test_end_to_end_flow() {
    let log = MemoryEventLog::new(4);
    let store = MemoryStore::new();
    let alice = store.add_portfolio(1).unwrap();
    let bob = store.add_portfolio(2).unwrap();
    store.add_watched_stock(alice.id, "AAPL", dec!(150)).unwrap();
    store.add_watched_stock(bob.id, "AAPL", dec!(200)).unwrap();
    store.add_watched_stock(bob.id, "MSFT", dec!(400)).unwrap();

    let source = StaticPriceSource::new();
    source.push_price("AAPL", dec!(160));
    source.push_price("AAPL", dec!(170));
    source.push_price("MSFT", dec!(390));

    let config = config(Role::ALL.to_vec());
    let handle = Pipeline::new(config.clone(), bus(&log), Arc::new(store.clone()))
        .with_price_source(Arc::new(source.clone()))
        .spawn()
        .unwrap();
    assert_eq!(handle.task_names().len(), 5);

    wait_until(|| log.len(TOPIC) >= 2 && all_caught_up(&log, &config)).await;
    handle.shutdown().await;

    // MSFT never crossed 400, so only AAPL was published
    let records = store.price_records();
    assert!(records.iter().all(|r| r.symbol == "AAPL"));
    assert_eq!(records.len(), log.len(TOPIC));

    let alerts = store.alerts();
    assert_eq!(alerts.len(), log.len(TOPIC));
    assert!(alerts.iter().all(|a| a.user_id == 1));

    let day = records[0].timestamp.date_naive();
    let daily = store.daily("AAPL", day).await.unwrap().unwrap();
    assert_eq!(daily.sample_count as usize, records.len());
    assert!(daily.min_price <= daily.avg_price && daily.avg_price <= daily.max_price);

    let signals = store.signals_for("AAPL");
    assert_eq!(signals.len(), records.len());
    assert!(signals.iter().all(|s| s.signal == Trend::Neutral));
    assert!(store.signals_for("MSFT").is_empty());
}

/// The same event delivered twice must leave every store as if delivered once.
#[tokio::test]
async fn test_duplicate_delivery_is_idempotent() {
    let log = MemoryEventLog::new(2);
    let store = MemoryStore::new();
    let p = store.add_portfolio(7).unwrap();
    store.add_watched_stock(p.id, "NVDA", dec!(100)).unwrap();

    let b = bus(&log);
    let event = PriceEvent::new(
        "NVDA",
        dec!(120),
        Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap(),
    )
    .unwrap();
    b.publish(&event).await.unwrap();
    b.publish(&event).await.unwrap();

    let config = config(vec![Role::Alert, Role::Persistence, Role::Daily, Role::Signal]);
    let handle = Pipeline::new(config.clone(), b, Arc::new(store.clone()))
        .spawn()
        .unwrap();
    wait_until(|| all_caught_up(&log, &config)).await;
    handle.shutdown().await;

    assert_eq!(store.alerts().len(), 1);
    assert_eq!(store.price_records().len(), 1);
    assert_eq!(store.signals().len(), 1);
    let daily = store.daily("NVDA", event.day()).await.unwrap().unwrap();
    assert_eq!(daily.sample_count, 1);
    assert_eq!(daily.avg_price, dec!(120));
}

/// A consumer group that starts late still sees the whole stream.
#[tokio::test]
async fn test_late_consumer_replays_history() {
    let log = MemoryEventLog::new(4);
    let store = MemoryStore::new();
    let b = bus(&log);
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
    for i in 0..25 {
        let price = Decimal::from(100 + i);
        let at = start + chrono::Duration::minutes(i);
        b.publish(&PriceEvent::new("AAPL", price, at).unwrap())
            .await
            .unwrap();
    }

    let config = config(vec![Role::Signal]);
    let handle = Pipeline::new(config.clone(), b, Arc::new(store.clone()))
        .spawn()
        .unwrap();
    assert_eq!(handle.task_names(), vec!["SIGNAL"]);
    wait_until(|| log.lag(TOPIC, &config.groups.signal_analytics) == 0).await;
    handle.shutdown().await;

    let signals = store.signals_for("AAPL");
    assert_eq!(signals.len(), 25);
    let last = signals.last().unwrap();
    assert_eq!(last.signal, Trend::Bullish);
    // window holds prices 105..=124
    assert_eq!(last.avg_long, Some(dec!(114.5)));
    assert_eq!(last.avg_short, Some(dec!(122)));
}

/// Window storage that outlives a pipeline and counts writes.
#[derive(Default)]
struct SharedWindows {
    inner: MemoryWindowStore,
    saves: AtomicUsize,
}

#[async_trait]
impl WindowStore for SharedWindows {
    async fn load(&self, symbol: &str) -> Result<Option<RollingWindow>, StoreError> {
        self.inner.load(symbol).await
    }

    async fn save(&self, symbol: &str, window: RollingWindow) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(symbol, window).await
    }
}

/// With a window store that survives restarts, signals pick up where they left off.
#[tokio::test]
async fn test_injected_window_store_survives_restart() {
    let log = MemoryEventLog::new(2);
    let store = MemoryStore::new();
    let windows = Arc::new(SharedWindows::default());
    let config = config(vec![Role::Signal]);
    let group = config.groups.signal_analytics.clone();
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();

    for (from, to) in [(0, 20), (20, 25)] {
        let b = bus(&log);
        for i in from..to {
            let at = start + chrono::Duration::minutes(i);
            b.publish(&PriceEvent::new("AAPL", Decimal::from(100 + i), at).unwrap())
                .await
                .unwrap();
        }
        let handle = Pipeline::new(config.clone(), b, Arc::new(store.clone()))
            .with_window_store(windows.clone())
            .spawn()
            .unwrap();
        wait_until(|| log.lag(TOPIC, &group) == 0).await;
        handle.shutdown().await;
    }

    assert_eq!(windows.saves.load(Ordering::SeqCst), 25);
    let window = windows.load("AAPL").await.unwrap().unwrap();
    assert_eq!(window.len(), 20);
    assert_eq!(window.last_observed(), Some(start + chrono::Duration::minutes(24)));

    let last = store.signals_for("AAPL").pop().unwrap();
    assert_eq!(last.signal, Trend::Bullish);
    assert_eq!(last.avg_long, Some(dec!(114.5)));
}

#[tokio::test]
async fn test_fetcher_role_requires_price_source() {
    let log = MemoryEventLog::new(1);
    let result = Pipeline::new(
        config(vec![Role::Fetcher]),
        bus(&log),
        Arc::new(MemoryStore::new()),
    )
    .spawn();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_connect_memory_backend() {
    let config = AppConfig::default();
    let log = stock_pulse::bus::connect(&config.event_log).unwrap();
    assert_eq!(log.name(), "memory");

    let mut bad = config.event_log.clone();
    bad.backend = "carrier-pigeon".to_string();
    assert!(stock_pulse::bus::connect(&bad).is_err());
}
