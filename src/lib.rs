pub mod api;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod connections;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod lookup;
pub mod pool_toml;
pub mod scheduler;
pub mod sync;
pub mod telemetry;
pub mod types;
