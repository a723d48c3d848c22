//! Commerce Metrics Engine Library
//!
//! Turns an append-only e-commerce event log into derived tables: revenue
//! buckets, product KPIs, health scores and trending scores.

pub mod analytics;
pub mod background_jobs;
pub mod catalog;
pub mod config;
pub mod events;
pub mod metrics_store;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use metrics_store::{MetricsStore, SqliteMetricsStore};
pub use server::{run_server, RequestsLoggingLevel};
