mod models;
mod schema;
mod sqlite_metrics_store;

pub use models::*;
pub use schema::METRICS_VERSIONED_SCHEMAS;
pub use sqlite_metrics_store::SqliteMetricsStore;

use crate::analytics::{
    Granularity, ProductHealthScore, ProductKpi, RevenueBucket, RevenueUpdate, TrendingScore,
};
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Output side of the engine: derived tables, pipeline state and job bookkeeping.
///
/// Every `commit_*`/`replace_*` call is atomic. A failing call leaves the
/// previously committed rows untouched.
pub trait MetricsStore: Send + Sync {
    // Revenue
    /// Maximum committed bucket start, `None` before the first commit.
    fn get_revenue_watermark(&self, granularity: Granularity) -> Result<Option<DateTime<Utc>>>;
    /// Write the buckets and the new watermark in one transaction.
    /// Returns the number of bucket rows written.
    fn commit_revenue(&self, update: &RevenueUpdate) -> Result<usize>;
    fn get_revenue_buckets(
        &self,
        granularity: Granularity,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RevenueBucket>>;

    // Product snapshots, fully replaced on every run
    fn replace_product_kpis(&self, kpis: &[ProductKpi]) -> Result<usize>;
    fn get_product_kpis(&self) -> Result<Vec<ProductKpi>>;
    fn get_product_kpi(&self, product_id: &str) -> Result<Option<ProductKpi>>;
    fn replace_health_scores(&self, scores: &[ProductHealthScore]) -> Result<usize>;
    fn get_health_scores(&self) -> Result<Vec<ProductHealthScore>>;
    fn replace_trending_scores(&self, scores: &[TrendingScore]) -> Result<usize>;
    fn get_trending_scores(&self) -> Result<Vec<TrendingScore>>;

    // Job runs
    fn record_job_start(&self, job_id: &str, triggered_by: &str) -> Result<i64>;
    fn record_job_finish(
        &self,
        run_id: i64,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<()>;
    fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>>;
    fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>>;
    fn mark_stale_jobs_failed(&self) -> Result<usize>;

    // Schedule state
    fn get_schedule_state(&self, job_id: &str) -> Result<Option<JobScheduleState>>;
    fn update_schedule_state(&self, state: &JobScheduleState) -> Result<()>;
}
