//! Scores products from the committed KPI snapshot.
//!
//! Runs on [`HookEvent::ProductKpisCommitted`] and never while the KPI rollup
//! is running, so it always reads a complete `product_kpis` table.

use super::product_kpis::PRODUCT_KPIS_JOB_ID;
use crate::analytics::{score_products, HealthWeights};
use crate::background_jobs::{BackgroundJob, HookEvent, JobContext, JobError, JobSchedule};
use crate::events::EventType;
use crate::server::metrics;
use anyhow::Context;
use tracing::info;

pub struct ProductHealthJob {
    weights: HealthWeights,
}

impl ProductHealthJob {
    pub fn new(weights: HealthWeights) -> Self {
        Self { weights }
    }
}

impl BackgroundJob for ProductHealthJob {
    fn id(&self) -> &'static str {
        "product_health"
    }

    fn name(&self) -> &'static str {
        "Product Health"
    }

    fn description(&self) -> &'static str {
        "Rank sales, rating and returns into a composite health score"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Hook(HookEvent::ProductKpisCommitted)
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &[PRODUCT_KPIS_JOB_ID]
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let kpis = ctx
            .metrics_store
            .get_product_kpis()
            .context("Failed to read product_kpis")?;
        let returns = ctx
            .event_store
            .read_events(EventType::ReturnItem, None)
            .context("Failed to read return events")?;

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let scores = score_products(&kpis, &returns, &self.weights);

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let written = ctx
            .metrics_store
            .replace_health_scores(&scores)
            .context("Failed to commit product_health_scores")?;
        metrics::record_rows_committed("product_health_scores", written);

        info!(
            "Product health: {} of {} products scored, {} returns",
            written,
            kpis.len(),
            returns.len()
        );
        Ok(())
    }
}
