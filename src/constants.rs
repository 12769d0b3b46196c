//! Application-wide constants and magic numbers
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make the pipeline easier to tune.

/// Event log constants
pub mod log {
    /// Topic carrying every price observation
    pub const PRICE_TOPIC: &str = "stock_prices";

    /// Default partition count for the in-process log
    pub const DEFAULT_PARTITIONS: usize = 4;

    /// Default broker address for local development
    pub const DEFAULT_BROKER: &str = "127.0.0.1:9093";

    /// Best-effort publish confirmation timeout
    pub const PUBLISH_TIMEOUT_MS: u64 = 2_000;
}

/// Stable consumer group identities, one per downstream function
pub mod groups {
    pub const ALERT: &str = "stock-alerts-consumer";
    pub const PERSISTENCE: &str = "persistence-consumer-group";
    pub const DAILY_ANALYTICS: &str = "daily-analytics-consumer-group";
    pub const SIGNAL_ANALYTICS: &str = "analytics-consumer-group";
}

/// Fetcher constants
pub mod fetcher {
    /// Default polling interval in seconds
    pub const DEFAULT_INTERVAL_SECS: u64 = 60;

    /// Longest accepted ticker symbol
    pub const MAX_SYMBOL_LEN: usize = 10;

    /// Highest accepted price; keeps window sums and daily averages far from
    /// decimal overflow
    pub const MAX_PRICE: u64 = 1_000_000_000;
}

/// Daily aggregate constants
pub mod daily {
    /// Days of per-event dedup keys kept behind the newest day seen
    pub const DEDUP_RETENTION_DAYS: u64 = 2;
}

/// Rolling window and moving average constants
pub mod signal {
    /// Samples retained per symbol
    pub const WINDOW_CAPACITY: usize = 20;

    /// Short moving average length
    pub const SHORT_WINDOW: usize = 5;

    /// Long moving average length
    pub const LONG_WINDOW: usize = 20;
}

/// Read retry backoff (exponential, capped)
pub mod backoff {
    pub const INITIAL_DELAY_MS: u64 = 100;
    pub const MAX_DELAY_MS: u64 = 30_000;
    pub const MULTIPLIER: f64 = 2.0;

    /// Fraction of the delay randomized to spread reconnect storms
    pub const JITTER: f64 = 0.1;
}

/// Shutdown constants
pub mod shutdown {
    /// How long workers get to finish the event in hand
    pub const DEFAULT_GRACE_SECS: u64 = 10;
}

/// Logging event names for structured logging
pub mod events {
    pub const PRICE_PUBLISHED: &str = "price_published";
    pub const PUBLISH_FAILED: &str = "publish_failed";
    pub const FETCH_FAILED: &str = "fetch_failed";
    pub const ALERT_CREATED: &str = "alert_created";
    pub const DUPLICATE_SKIPPED: &str = "duplicate_skipped";
    pub const POISON_MESSAGE: &str = "poison_message";
    pub const READ_RETRY: &str = "read_retry";
    pub const DAILY_UPDATED: &str = "daily_updated";
    pub const SIGNAL_GENERATED: &str = "signal_generated";
}
