pub mod alpha_vantage;
pub mod models;
pub mod source;
pub mod store;

pub use alpha_vantage::AlphaVantageSource;
pub use source::{PriceSource, StaticPriceSource};
pub use store::{MemoryStore, Store};

#[cfg(test)]
mod source_tests;
