//! Derived tables computed from the event log.
//!
//! Everything in here is a pure function of its inputs: reading the stores and
//! committing results is left to the background jobs, so each transform can be
//! tested on plain vectors.

pub mod health;
pub mod kpi;
mod models;
pub mod revenue;
pub mod trending;

pub use health::{percent_rank, score_products, HealthWeights};
pub use kpi::rollup_kpis;
pub use models::{Granularity, ProductHealthScore, ProductKpi, RevenueBucket, TrendingScore};
pub use revenue::{aggregate_revenue, apply_update, RevenueUpdate, RunMode};
pub use trending::{detect_trends, TrendWindows};

/// Division that yields `None` instead of a spurious value when the
/// denominator is zero.
pub fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    let quotient = numerator / denominator;
    quotient.is_finite().then_some(quotient)
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
