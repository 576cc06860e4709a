pub mod aggregator;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod metrics;
pub mod refresh;
pub mod resolver;
pub mod sources;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testkit;
