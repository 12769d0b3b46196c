pub mod alert;
pub mod backoff;
pub mod consumer;
pub mod daily_analytics;
pub mod fetcher;
pub mod persistence;
pub mod signal_analytics;
pub mod window;

#[cfg(test)]
mod daily_analytics_tests;
