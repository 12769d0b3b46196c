//! StockPulse - stock price fan-out pipeline
//!
//! A fetcher polls quotes for watched symbols and publishes price events onto
//! a partitioned log. Independent consumer groups turn that stream into user
//! alerts, a price history, per-day aggregates and moving-average signals.

pub mod bus;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod services;
pub mod shutdown;

// Re-export commonly used types
pub use bus::{EventBus, EventLog, MemoryEventLog};
pub use config::{AppConfig, Role};
pub use error::PipelineError;
pub use events::{PriceEvent, Trend};
pub use pipeline::{Pipeline, PipelineHandle};

#[cfg(test)]
mod config_tests;
