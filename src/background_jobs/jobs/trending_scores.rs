//! Recomputes `trending_scores` from the full view history.

use crate::analytics::{detect_trends, TrendWindows};
use crate::background_jobs::{BackgroundJob, JobContext, JobError, JobSchedule};
use crate::events::EventType;
use crate::server::metrics;
use anyhow::Context;
use std::time::Duration;
use tracing::info;

pub struct TrendingScoresJob {
    windows: TrendWindows,
    interval: Duration,
}

impl TrendingScoresJob {
    pub fn new(windows: TrendWindows, interval: Duration) -> Self {
        Self { windows, interval }
    }
}

impl BackgroundJob for TrendingScoresJob {
    fn id(&self) -> &'static str {
        "trending_scores"
    }

    fn name(&self) -> &'static str {
        "Trending Scores"
    }

    fn description(&self) -> &'static str {
        "Compare each product's short and long trailing view averages"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let views = ctx
            .event_store
            .read_events(EventType::ProductView, None)
            .context("Failed to read product views")?;

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let scores = detect_trends(&views, &self.windows);

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let written = ctx
            .metrics_store
            .replace_trending_scores(&scores)
            .context("Failed to commit trending_scores")?;
        metrics::record_rows_committed("trending_scores", written);

        info!(
            "Trending scores: {} views over {} products",
            views.len(),
            written
        );
        Ok(())
    }
}
