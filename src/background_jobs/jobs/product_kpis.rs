//! Lifetime KPI rollup, fully rebuilt on every run.
//!
//! Reads the catalog snapshot plus all purchase and view events and replaces
//! `product_kpis` in one transaction. A successful commit fires
//! [`HookEvent::ProductKpisCommitted`] so the health scorer runs on the fresh
//! snapshot.

use crate::analytics::rollup_kpis;
use crate::background_jobs::{BackgroundJob, HookEvent, JobContext, JobError, JobSchedule};
use crate::events::EventType;
use crate::server::metrics;
use anyhow::Context;
use std::time::Duration;
use tracing::info;

pub const PRODUCT_KPIS_JOB_ID: &str = "product_kpis";

pub struct ProductKpiJob {
    interval: Duration,
}

impl ProductKpiJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackgroundJob for ProductKpiJob {
    fn id(&self) -> &'static str {
        PRODUCT_KPIS_JOB_ID
    }

    fn name(&self) -> &'static str {
        "Product KPIs"
    }

    fn description(&self) -> &'static str {
        "Roll up lifetime sales and view metrics for every catalog product"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    fn completion_hook(&self) -> Option<HookEvent> {
        Some(HookEvent::ProductKpisCommitted)
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let catalog = ctx.catalog.read_catalog().context("Failed to read catalog")?;
        let purchases = ctx
            .event_store
            .read_events(EventType::Purchase, None)
            .context("Failed to read purchase events")?;
        let views = ctx
            .event_store
            .read_events(EventType::ProductView, None)
            .context("Failed to read product views")?;

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let kpis = rollup_kpis(&purchases, &views, &catalog);

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let written = ctx
            .metrics_store
            .replace_product_kpis(&kpis)
            .context("Failed to commit product_kpis")?;
        metrics::record_rows_committed("product_kpis", written);

        info!(
            "Product KPIs: {} products, {} purchases, {} views",
            written,
            purchases.len(),
            views.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::jobs::test_support::{at, product, purchase, view, TestStores};
    use crate::catalog::{CatalogSource, Product};
    use crate::metrics_store::MetricsStore;
    use std::sync::Arc;

    struct UnavailableCatalog;

    impl CatalogSource for UnavailableCatalog {
        fn read_catalog(&self) -> anyhow::Result<Vec<Product>> {
            anyhow::bail!("catalog offline")
        }
    }

    #[test]
    fn test_one_row_per_catalog_product() {
        let stores = TestStores::new();
        stores.seed_catalog(vec![product("P1", 4.5), product("P2", 3.0)]);
        stores.append(vec![
            purchase("e1", "P1", at(1, 10, 0), 20.0, 2),
            view("v1", "P1", at(1, 9, 0)),
            view("v2", "P1", at(1, 9, 30)),
        ]);

        ProductKpiJob::new(Duration::from_secs(3600))
            .execute(&stores.context())
            .unwrap();

        let kpis = stores.metrics.get_product_kpis().unwrap();
        assert_eq!(kpis.len(), 2);
        assert_eq!(kpis[0].product_id, "P1");
        assert_eq!(kpis[0].total_revenue, 40.0);
        assert_eq!(kpis[0].number_of_views, 2);
        assert_eq!(kpis[0].view_to_sale_conversion_rate, Some(0.5));
        assert_eq!(kpis[1].units_sold, 0);
        assert_eq!(kpis[1].average_selling_price, None);
    }

    #[test]
    fn test_failed_catalog_read_keeps_previous_snapshot() {
        let stores = TestStores::new();
        stores.seed_catalog(vec![product("P1", 4.5)]);
        let job = ProductKpiJob::new(Duration::from_secs(3600));
        job.execute(&stores.context()).unwrap();

        let mut ctx = stores.context();
        ctx.catalog = Arc::new(UnavailableCatalog);
        let result = job.execute(&ctx);

        match result {
            Err(JobError::ExecutionFailed(msg)) => assert!(msg.contains("catalog offline")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(stores.metrics.get_product_kpis().unwrap().len(), 1);
    }

    #[test]
    fn test_fires_completion_hook() {
        let job = ProductKpiJob::new(Duration::from_secs(3600));
        assert_eq!(job.completion_hook(), Some(HookEvent::ProductKpisCommitted));
    }
}
