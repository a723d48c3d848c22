//! The engine's jobs: one per derived table.
//!
//! Revenue rollups and trending scores run on their own intervals. The health
//! scorer listens for the KPI rollup's completion hook instead of a timer.

pub mod product_health;
pub mod product_kpis;
pub mod revenue_rollup;
pub mod trending_scores;

pub use product_health::ProductHealthJob;
pub use product_kpis::{ProductKpiJob, PRODUCT_KPIS_JOB_ID};
pub use revenue_rollup::RevenueRollupJob;
pub use trending_scores::TrendingScoresJob;

use super::BackgroundJob;
use crate::analytics::Granularity;
use crate::config::AppConfig;
use std::sync::Arc;

/// Instantiate every job from the resolved configuration.
pub fn build_jobs(config: &AppConfig) -> Vec<Arc<dyn BackgroundJob>> {
    vec![
        Arc::new(RevenueRollupJob::new(
            Granularity::Hourly,
            &config.revenue,
            config.jobs.revenue(),
        )),
        Arc::new(RevenueRollupJob::new(
            Granularity::Daily,
            &config.revenue,
            config.jobs.revenue(),
        )),
        Arc::new(TrendingScoresJob::new(
            config.trend_windows,
            config.jobs.trending(),
        )),
        Arc::new(ProductKpiJob::new(config.jobs.kpi())),
        Arc::new(ProductHealthJob::new(config.health_weights)),
    ]
}
