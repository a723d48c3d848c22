//! Incremental revenue bucketing job.
//!
//! One instance per granularity. Each run reads the committed watermark,
//! picks the run mode from it, reads only the purchases the mode can still
//! change and commits buckets and the new watermark in one transaction.
//!
//! A manual trigger with `{"full_rebuild": true}` ignores the watermark and
//! recomputes the whole table from the event history.

use crate::analytics::{aggregate_revenue, Granularity, RunMode};
use crate::background_jobs::{BackgroundJob, JobContext, JobError, JobSchedule};
use crate::config::RevenueSettings;
use crate::events::EventType;
use crate::server::metrics;
use anyhow::Context;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info};

pub struct RevenueRollupJob {
    granularity: Granularity,
    revisit_open_bucket: bool,
    interval: Duration,
}

impl RevenueRollupJob {
    pub fn new(granularity: Granularity, settings: &RevenueSettings, interval: Duration) -> Self {
        Self {
            granularity,
            revisit_open_bucket: settings.revisit_open_bucket,
            interval,
        }
    }

    fn run(&self, ctx: &JobContext, full_rebuild: bool) -> Result<(), JobError> {
        let granularity = self.granularity;

        let mode = if full_rebuild {
            RunMode::FullRebuild
        } else {
            let watermark = ctx
                .metrics_store
                .get_revenue_watermark(granularity)
                .with_context(|| format!("Failed to read {} revenue watermark", granularity))?;
            RunMode::from_watermark(watermark)
        };
        let since = mode.read_lower_bound(granularity, self.revisit_open_bucket);
        info!(
            "{} revenue run: mode={:?}, reading purchases since {:?}",
            granularity, mode, since
        );

        let purchases = ctx
            .event_store
            .read_events(EventType::Purchase, since)
            .context("Failed to read purchase events")?;
        debug!("Read {} purchase events", purchases.len());

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let update = aggregate_revenue(granularity, mode, &purchases, self.revisit_open_bucket);

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let written = ctx
            .metrics_store
            .commit_revenue(&update)
            .with_context(|| format!("Failed to commit {} revenue buckets", granularity))?;

        metrics::record_rows_committed(&format!("revenue_{}", granularity), written);
        if let Some(watermark) = update.watermark {
            metrics::set_revenue_watermark(granularity, watermark);
        }

        info!(
            "{} revenue: {} buckets written, watermark now {:?}",
            granularity, written, update.watermark
        );
        Ok(())
    }
}

impl BackgroundJob for RevenueRollupJob {
    fn id(&self) -> &'static str {
        match self.granularity {
            Granularity::Hourly => "hourly_revenue",
            Granularity::Daily => "daily_revenue",
        }
    }

    fn name(&self) -> &'static str {
        match self.granularity {
            Granularity::Hourly => "Hourly Revenue",
            Granularity::Daily => "Daily Revenue",
        }
    }

    fn description(&self) -> &'static str {
        match self.granularity {
            Granularity::Hourly => "Extend revenue_hourly past the committed watermark",
            Granularity::Daily => "Extend revenue_daily past the committed watermark",
        }
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        self.run(ctx, false)
    }

    fn execute_with_params(
        &self,
        ctx: &JobContext,
        params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        let full_rebuild = match params.as_ref().and_then(|p| p.get("full_rebuild")) {
            None => false,
            Some(JsonValue::Bool(flag)) => *flag,
            Some(other) => {
                return Err(JobError::ExecutionFailed(format!(
                    "full_rebuild must be a boolean, got {}",
                    other
                )))
            }
        };
        self.run(ctx, full_rebuild)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::jobs::test_support::{at, purchase, TestStores};
    use crate::metrics_store::MetricsStore;
    use serde_json::json;

    fn hourly_job(revisit_open_bucket: bool) -> RevenueRollupJob {
        RevenueRollupJob::new(
            Granularity::Hourly,
            &RevenueSettings {
                revisit_open_bucket,
            },
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_ids_per_granularity() {
        let settings = RevenueSettings::default();
        let daily = RevenueRollupJob::new(Granularity::Daily, &settings, Duration::from_secs(60));
        assert_eq!(hourly_job(false).id(), "hourly_revenue");
        assert_eq!(daily.id(), "daily_revenue");
    }

    #[test]
    fn test_first_run_then_incremental_extends_table() {
        let stores = TestStores::new();
        stores.append(vec![
            purchase("e1", "P1", at(1, 10, 5), 100.0, 1),
            purchase("e2", "P1", at(1, 10, 40), 50.0, 2),
        ]);
        let job = hourly_job(false);
        let ctx = stores.context();

        job.execute(&ctx).unwrap();
        let buckets = stores.metrics.get_revenue_buckets(Granularity::Hourly, None).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].total_revenue, 200.0);

        // A late event for the finalized 10:00 bucket plus a new 11:00 event
        stores.append(vec![
            purchase("e3", "P2", at(1, 10, 59), 999.0, 1),
            purchase("e4", "P2", at(1, 11, 15), 30.0, 1),
        ]);
        job.execute(&ctx).unwrap();

        let buckets = stores.metrics.get_revenue_buckets(Granularity::Hourly, None).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].total_revenue, 200.0);
        assert_eq!(buckets[1].total_revenue, 30.0);
        assert_eq!(
            stores.metrics.get_revenue_watermark(Granularity::Hourly).unwrap(),
            Some(at(1, 11, 0))
        );
    }

    #[test]
    fn test_rerun_without_new_events_is_idempotent() {
        let stores = TestStores::new();
        stores.append(vec![purchase("e1", "P1", at(1, 10, 5), 100.0, 1)]);
        let job = hourly_job(false);
        let ctx = stores.context();

        job.execute(&ctx).unwrap();
        let first = stores.metrics.get_revenue_buckets(Granularity::Hourly, None).unwrap();
        job.execute(&ctx).unwrap();
        let second = stores.metrics.get_revenue_buckets(Granularity::Hourly, None).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_revisit_open_bucket_picks_up_late_events() {
        let stores = TestStores::new();
        stores.append(vec![purchase("e1", "P1", at(1, 10, 5), 100.0, 1)]);
        let job = hourly_job(true);
        let ctx = stores.context();
        job.execute(&ctx).unwrap();

        stores.append(vec![purchase("e2", "P1", at(1, 10, 50), 25.0, 1)]);
        job.execute(&ctx).unwrap();

        let buckets = stores.metrics.get_revenue_buckets(Granularity::Hourly, None).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].total_revenue, 125.0);
    }

    #[test]
    fn test_full_rebuild_param_recomputes_finalized_buckets() {
        let stores = TestStores::new();
        stores.append(vec![purchase("e1", "P1", at(1, 10, 5), 100.0, 1)]);
        let job = hourly_job(false);
        let ctx = stores.context();
        job.execute(&ctx).unwrap();

        stores.append(vec![purchase("e2", "P1", at(1, 10, 50), 25.0, 1)]);
        job.execute_with_params(&ctx, Some(json!({"full_rebuild": true})))
            .unwrap();

        let buckets = stores.metrics.get_revenue_buckets(Granularity::Hourly, None).unwrap();
        assert_eq!(buckets[0].total_revenue, 125.0);
    }

    #[test]
    fn test_invalid_full_rebuild_param() {
        let stores = TestStores::new();
        let params = Some(json!({"full_rebuild": "yes"}));
        let result = hourly_job(false).execute_with_params(&stores.context(), params);
        assert!(matches!(result, Err(JobError::ExecutionFailed(_))));
    }

    #[test]
    fn test_cancelled_run_commits_nothing() {
        let stores = TestStores::new();
        stores.append(vec![purchase("e1", "P1", at(1, 10, 5), 100.0, 1)]);
        let ctx = stores.context();
        ctx.cancellation_token.cancel();

        let result = hourly_job(false).execute(&ctx);

        assert!(matches!(result, Err(JobError::Cancelled)));
        assert!(stores
            .metrics
            .get_revenue_buckets(Granularity::Hourly, None)
            .unwrap()
            .is_empty());
        assert_eq!(
            stores.metrics.get_revenue_watermark(Granularity::Hourly).unwrap(),
            None
        );
    }
}
