//! Custom error types for the price pipeline
//!
//! Provides structured, typed errors instead of generic Box<dyn Error>

use rust_decimal::Decimal;
use thiserror::Error;

/// Top-level pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Event log error: {0}")]
    Log(#[from] LogError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Price source error: {0}")]
    Source(#[from] SourceError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Portfolio {portfolio_id} not found for watched stock {symbol}")]
    PortfolioMissing { portfolio_id: u64, symbol: String },
}

impl PipelineError {
    /// Infrastructure failures worth retrying; everything else is skipped.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Log(e) => e.is_transient(),
            PipelineError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Event log (broker) errors
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Commit failed for group {group}: {reason}")]
    Commit { group: String, reason: String },

    #[error("Subscription closed for group {group}")]
    Closed { group: String },
}

impl LogError {
    /// Whether a retry of the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, LogError::Closed { .. })
    }
}

/// Failure while publishing a typed event
#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Encode(#[from] DecodeError),

    #[error(transparent)]
    Log(#[from] LogError),
}

/// Durable store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Price source (quote API) errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Rate limited or unknown symbol {symbol}: empty quote")]
    EmptyQuote { symbol: String },

    #[error("Rate limited for {symbol}: {message}")]
    RateLimited { symbol: String, message: String },

    #[error("HTTP {status} for {symbol}")]
    Http { status: u16, symbol: String },

    #[error("Failed to parse price '{raw}' for {symbol}")]
    Parse { symbol: String, raw: String },

    #[error("No price available for {symbol}")]
    NotFound { symbol: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Payload decoding and validation errors
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Payload is not valid UTF-8")]
    Utf8,

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid symbol '{0}' (expected 1..=10 chars)")]
    InvalidSymbol(String),

    #[error("Invalid price {price} for {symbol} (must be in (0, 1e9])")]
    InvalidPrice { symbol: String, price: Decimal },
}

/// Startup configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {field}: {value}")]
    Invalid { field: &'static str, value: String },
}
