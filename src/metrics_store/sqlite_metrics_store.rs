use super::models::{revenue_watermark_key, JobRun, JobRunStatus, JobScheduleState};
use super::schema::METRICS_VERSIONED_SCHEMAS;
use super::MetricsStore;
use crate::analytics::{
    Granularity, ProductHealthScore, ProductKpi, RevenueBucket, RevenueUpdate, RunMode,
    TrendingScore,
};
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const VIEW_DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteMetricsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetricsStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, METRICS_VERSIONED_SCHEMAS, "metrics")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Metrics database connection lock poisoned"))
    }

    fn revenue_table(granularity: Granularity) -> &'static str {
        match granularity {
            Granularity::Hourly => "revenue_hourly",
            Granularity::Daily => "revenue_daily",
        }
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn timestamp_from_column(idx: usize, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
    }

    fn row_to_bucket(row: &rusqlite::Row) -> rusqlite::Result<RevenueBucket> {
        Ok(RevenueBucket {
            bucket_start: Self::timestamp_from_column(0, row.get(0)?)?,
            total_revenue: row.get(1)?,
        })
    }

    fn row_to_kpi(row: &rusqlite::Row) -> rusqlite::Result<ProductKpi> {
        Ok(ProductKpi {
            product_id: row.get("product_id")?,
            product_name: row.get("product_name")?,
            category: row.get("category")?,
            avg_rating: row.get("avg_rating")?,
            review_count: row.get("review_count")?,
            total_revenue: row.get("total_revenue")?,
            units_sold: row.get("units_sold")?,
            average_selling_price: row.get("average_selling_price")?,
            discounted_units_sold: row.get("discounted_units_sold")?,
            number_of_orders: row.get("number_of_orders")?,
            number_of_views: row.get("number_of_views")?,
            view_to_sale_conversion_rate: row.get("view_to_sale_conversion_rate")?,
            discount_effectiveness_ratio: row.get("discount_effectiveness_ratio")?,
        })
    }

    fn row_to_health_score(row: &rusqlite::Row) -> rusqlite::Result<ProductHealthScore> {
        Ok(ProductHealthScore {
            product_id: row.get("product_id")?,
            product_name: row.get("product_name")?,
            total_revenue: row.get("total_revenue")?,
            avg_rating: row.get("avg_rating")?,
            units_sold: row.get("units_sold")?,
            number_of_returns: row.get("number_of_returns")?,
            return_rate: row.get("return_rate")?,
            sales_rank_score: row.get("sales_rank_score")?,
            rating_rank_score: row.get("rating_rank_score")?,
            return_rank_score: row.get("return_rank_score")?,
            health_score: row.get("health_score")?,
        })
    }

    fn row_to_trending_score(row: &rusqlite::Row) -> rusqlite::Result<TrendingScore> {
        let view_date_str: String = row.get("view_date")?;
        let view_date = NaiveDate::parse_from_str(&view_date_str, VIEW_DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
        Ok(TrendingScore {
            product_id: row.get("product_id")?,
            view_date,
            daily_views: row.get("daily_views")?,
            seven_day_avg_views: row.get("seven_day_avg_views")?,
            twenty_eight_day_avg_views: row.get("twenty_eight_day_avg_views")?,
            trending_score: row.get("trending_score")?,
        })
    }

    fn row_to_job_run(row: &rusqlite::Row) -> rusqlite::Result<JobRun> {
        let status_str: String = row.get("status")?;
        let status = JobRunStatus::parse(&status_str).unwrap_or(JobRunStatus::Failed);

        let started_at_str: String = row.get("started_at")?;
        let finished_at_str: Option<String> = row.get("finished_at")?;

        Ok(JobRun {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            started_at: Self::parse_datetime(&started_at_str).unwrap_or_else(Utc::now),
            finished_at: finished_at_str.and_then(|s| Self::parse_datetime(&s)),
            status,
            error_message: row.get("error_message")?,
            triggered_by: row.get("triggered_by")?,
        })
    }

    fn row_to_schedule_state(row: &rusqlite::Row) -> rusqlite::Result<JobScheduleState> {
        let next_run_at_str: String = row.get("next_run_at")?;
        let last_run_at_str: Option<String> = row.get("last_run_at")?;

        Ok(JobScheduleState {
            job_id: row.get("job_id")?,
            next_run_at: Self::parse_datetime(&next_run_at_str).unwrap_or_else(Utc::now),
            last_run_at: last_run_at_str.and_then(|s| Self::parse_datetime(&s)),
        })
    }
}

impl MetricsStore for SqliteMetricsStore {
    fn get_revenue_watermark(&self, granularity: Granularity) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM pipeline_state WHERE key = ?1",
                params![revenue_watermark_key(granularity)],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(value) = stored {
            let watermark = Self::parse_datetime(&value)
                .with_context(|| format!("Invalid {} revenue watermark '{}'", granularity, value))?;
            return Ok(Some(watermark));
        }

        // No recorded watermark: fall back to the newest committed bucket
        let max_bucket: Option<i64> = conn.query_row(
            &format!(
                "SELECT MAX(bucket_start) FROM {}",
                Self::revenue_table(granularity)
            ),
            [],
            |row| row.get(0),
        )?;
        max_bucket
            .map(|secs| {
                DateTime::from_timestamp(secs, 0)
                    .with_context(|| format!("Invalid bucket_start {}", secs))
            })
            .transpose()
    }

    fn commit_revenue(&self, update: &RevenueUpdate) -> Result<usize> {
        let table = Self::revenue_table(update.granularity);
        let key = revenue_watermark_key(update.granularity);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if update.mode == RunMode::FullRebuild {
            let removed = tx.execute(&format!("DELETE FROM {}", table), [])?;
            debug!("Full rebuild cleared {} rows from {}", removed, table);
        }
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (bucket_start, total_revenue, updated_at)
                 VALUES (?1, ?2, cast(strftime('%s','now') as int))
                 ON CONFLICT(bucket_start) DO UPDATE SET
                    total_revenue = excluded.total_revenue,
                    updated_at = excluded.updated_at",
                table
            ))?;
            for bucket in &update.buckets {
                stmt.execute(params![bucket.bucket_start.timestamp(), bucket.total_revenue])?;
            }
        }

        match update.watermark {
            Some(watermark) => {
                tx.execute(
                    "INSERT INTO pipeline_state (key, value, updated_at)
                     VALUES (?1, ?2, datetime('now'))
                     ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
                    params![key, Self::format_datetime(&watermark)],
                )?;
            }
            None => {
                tx.execute("DELETE FROM pipeline_state WHERE key = ?1", params![key])?;
            }
        }

        tx.commit()
            .with_context(|| format!("Failed to commit {} revenue", update.granularity))?;
        info!(
            "Committed {} {} revenue buckets, watermark {:?}",
            update.buckets.len(),
            update.granularity,
            update.watermark
        );
        Ok(update.buckets.len())
    }

    fn get_revenue_buckets(
        &self,
        granularity: Granularity,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RevenueBucket>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT bucket_start, total_revenue FROM {}
             WHERE bucket_start >= ?1 ORDER BY bucket_start",
            Self::revenue_table(granularity)
        ))?;
        let lower = since.map(|ts| ts.timestamp()).unwrap_or(i64::MIN);
        let buckets = stmt
            .query_map(params![lower], Self::row_to_bucket)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(buckets)
    }

    fn replace_product_kpis(&self, kpis: &[ProductKpi]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM product_kpis", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO product_kpis
                 (product_id, product_name, category, avg_rating, review_count, total_revenue,
                  units_sold, average_selling_price, discounted_units_sold, number_of_orders,
                  number_of_views, view_to_sale_conversion_rate, discount_effectiveness_ratio)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for k in kpis {
                stmt.execute(params![
                    k.product_id,
                    k.product_name,
                    k.category,
                    k.avg_rating,
                    k.review_count,
                    k.total_revenue,
                    k.units_sold,
                    k.average_selling_price,
                    k.discounted_units_sold,
                    k.number_of_orders,
                    k.number_of_views,
                    k.view_to_sale_conversion_rate,
                    k.discount_effectiveness_ratio,
                ])
                .with_context(|| format!("Failed to insert KPI row for {}", k.product_id))?;
            }
        }
        tx.commit()?;
        Ok(kpis.len())
    }

    fn get_product_kpis(&self) -> Result<Vec<ProductKpi>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM product_kpis ORDER BY product_id")?;
        let kpis = stmt
            .query_map([], Self::row_to_kpi)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(kpis)
    }

    fn get_product_kpi(&self, product_id: &str) -> Result<Option<ProductKpi>> {
        let conn = self.conn()?;
        let kpi = conn
            .query_row(
                "SELECT * FROM product_kpis WHERE product_id = ?1",
                params![product_id],
                Self::row_to_kpi,
            )
            .optional()?;
        Ok(kpi)
    }

    fn replace_health_scores(&self, scores: &[ProductHealthScore]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM product_health_scores", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO product_health_scores
                 (product_id, product_name, total_revenue, avg_rating, units_sold,
                  number_of_returns, return_rate, sales_rank_score, rating_rank_score,
                  return_rank_score, health_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for s in scores {
                stmt.execute(params![
                    s.product_id,
                    s.product_name,
                    s.total_revenue,
                    s.avg_rating,
                    s.units_sold,
                    s.number_of_returns,
                    s.return_rate,
                    s.sales_rank_score,
                    s.rating_rank_score,
                    s.return_rank_score,
                    s.health_score,
                ])
                .with_context(|| format!("Failed to insert health score for {}", s.product_id))?;
            }
        }
        tx.commit()?;
        Ok(scores.len())
    }

    fn get_health_scores(&self) -> Result<Vec<ProductHealthScore>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM product_health_scores ORDER BY health_score DESC, product_id",
        )?;
        let scores = stmt
            .query_map([], Self::row_to_health_score)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scores)
    }

    fn replace_trending_scores(&self, scores: &[TrendingScore]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM trending_scores", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO trending_scores
                 (product_id, view_date, daily_views, seven_day_avg_views,
                  twenty_eight_day_avg_views, trending_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for s in scores {
                stmt.execute(params![
                    s.product_id,
                    s.view_date.format(VIEW_DATE_FORMAT).to_string(),
                    s.daily_views,
                    s.seven_day_avg_views,
                    s.twenty_eight_day_avg_views,
                    s.trending_score,
                ])?;
            }
        }
        tx.commit()?;
        Ok(scores.len())
    }

    fn get_trending_scores(&self) -> Result<Vec<TrendingScore>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM trending_scores ORDER BY product_id")?;
        let scores = stmt
            .query_map([], Self::row_to_trending_score)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scores)
    }

    fn record_job_start(&self, job_id: &str, triggered_by: &str) -> Result<i64> {
        let conn = self.conn()?;
        let now = Self::format_datetime(&Utc::now());

        conn.execute(
            "INSERT INTO job_runs (job_id, started_at, status, triggered_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![job_id, now, JobRunStatus::Running.as_str(), triggered_by],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn record_job_finish(
        &self,
        run_id: i64,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let now = Self::format_datetime(&Utc::now());

        conn.execute(
            "UPDATE job_runs SET finished_at = ?1, status = ?2, error_message = ?3 WHERE id = ?4",
            params![now, status.as_str(), error_message, run_id],
        )?;

        Ok(())
    }

    fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, started_at, finished_at, status, error_message, triggered_by
             FROM job_runs WHERE job_id = ?1 ORDER BY started_at DESC, id DESC LIMIT ?2",
        )?;

        let jobs = stmt
            .query_map(params![job_id, limit as i64], Self::row_to_job_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(jobs)
    }

    fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                "SELECT id, job_id, started_at, finished_at, status, error_message, triggered_by
                 FROM job_runs WHERE job_id = ?1 ORDER BY started_at DESC, id DESC LIMIT 1",
                params![job_id],
                Self::row_to_job_run,
            )
            .optional()?;

        Ok(job)
    }

    fn mark_stale_jobs_failed(&self) -> Result<usize> {
        let conn = self.conn()?;
        let now = Self::format_datetime(&Utc::now());

        // Runs still "running" at startup were interrupted by a crash or restart
        let count = conn.execute(
            "UPDATE job_runs SET status = ?1, finished_at = ?2, error_message = ?3
             WHERE status = ?4",
            params![
                JobRunStatus::Failed.as_str(),
                now,
                "Job was interrupted (engine restart)",
                JobRunStatus::Running.as_str()
            ],
        )?;

        Ok(count)
    }

    fn get_schedule_state(&self, job_id: &str) -> Result<Option<JobScheduleState>> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT job_id, next_run_at, last_run_at FROM job_schedules WHERE job_id = ?1",
                params![job_id],
                Self::row_to_schedule_state,
            )
            .optional()?;

        Ok(state)
    }

    fn update_schedule_state(&self, state: &JobScheduleState) -> Result<()> {
        let conn = self.conn()?;
        let next_run_at = Self::format_datetime(&state.next_run_at);
        let last_run_at = state.last_run_at.as_ref().map(Self::format_datetime);

        conn.execute(
            "INSERT INTO job_schedules (job_id, next_run_at, last_run_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(job_id) DO UPDATE SET next_run_at = ?2, last_run_at = ?3",
            params![state.job_id, next_run_at, last_run_at],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::aggregate_revenue;
    use crate::events::{Event, EventType};
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct TestStore {
        store: SqliteMetricsStore,
        _temp_dir: TempDir,
    }

    fn create_test_store() -> TestStore {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteMetricsStore::new(temp_dir.path().join("metrics.db")).unwrap();
        TestStore {
            store,
            _temp_dir: temp_dir,
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, d, 0, 0, 0).unwrap()
    }

    fn purchase(ts: DateTime<Utc>, price: f64) -> Event {
        Event {
            event_id: format!("e-{}", ts.timestamp()),
            event_timestamp: ts,
            event_type: EventType::Purchase,
            user_id: "u".to_string(),
            session_id: "s".to_string(),
            product_id: "P1".to_string(),
            sale_price: Some(price),
            quantity: 1,
            on_sale: false,
            rating: None,
            source: None,
        }
    }

    fn kpi(id: &str) -> ProductKpi {
        ProductKpi {
            product_id: id.to_string(),
            product_name: format!("Product {}", id),
            category: "Audio".to_string(),
            avg_rating: 4.1,
            review_count: 7,
            total_revenue: 120.5,
            units_sold: 3,
            average_selling_price: Some(40.1666),
            discounted_units_sold: 1,
            number_of_orders: 2,
            number_of_views: 0,
            view_to_sale_conversion_rate: None,
            discount_effectiveness_ratio: Some(1.0 / 3.0),
        }
    }

    #[test]
    fn test_watermark_missing_before_first_commit() {
        let test = create_test_store();
        assert_eq!(
            test.store.get_revenue_watermark(Granularity::Daily).unwrap(),
            None
        );
    }

    #[test]
    fn test_commit_revenue_persists_buckets_and_watermark() {
        let test = create_test_store();
        let store = &test.store;
        let events = vec![
            purchase(day(26) + chrono::Duration::hours(3), 150.0),
            purchase(day(26) + chrono::Duration::hours(20), 50.0),
        ];
        let update = aggregate_revenue(Granularity::Daily, RunMode::FullRebuild, &events, false);

        assert_eq!(store.commit_revenue(&update).unwrap(), 1);
        assert_eq!(
            store.get_revenue_watermark(Granularity::Daily).unwrap(),
            Some(day(26))
        );
        assert_eq!(
            store.get_revenue_buckets(Granularity::Daily, None).unwrap(),
            vec![RevenueBucket {
                bucket_start: day(26),
                total_revenue: 200.0
            }]
        );
        // Granularities are independent
        assert_eq!(
            store.get_revenue_watermark(Granularity::Hourly).unwrap(),
            None
        );
    }

    #[test]
    fn test_incremental_commit_upserts_and_keeps_older_rows() {
        let test = create_test_store();
        let store = &test.store;
        let first = aggregate_revenue(
            Granularity::Daily,
            RunMode::FullRebuild,
            &[purchase(day(25), 10.0), purchase(day(26), 20.0)],
            false,
        );
        store.commit_revenue(&first).unwrap();

        let watermark = store.get_revenue_watermark(Granularity::Daily).unwrap();
        let mode = RunMode::from_watermark(watermark);
        let second = aggregate_revenue(Granularity::Daily, mode, &[purchase(day(27), 30.0)], false);
        store.commit_revenue(&second).unwrap();

        let totals: Vec<f64> = store
            .get_revenue_buckets(Granularity::Daily, None)
            .unwrap()
            .iter()
            .map(|b| b.total_revenue)
            .collect();
        assert_eq!(totals, vec![10.0, 20.0, 30.0]);
        assert_eq!(
            store.get_revenue_watermark(Granularity::Daily).unwrap(),
            Some(day(27))
        );

        let since = store
            .get_revenue_buckets(Granularity::Daily, Some(day(26)))
            .unwrap();
        assert_eq!(since.len(), 2);
    }

    #[test]
    fn test_full_rebuild_clears_stale_buckets() {
        let test = create_test_store();
        let store = &test.store;
        store
            .commit_revenue(&aggregate_revenue(
                Granularity::Hourly,
                RunMode::FullRebuild,
                &[purchase(day(20), 5.0)],
                false,
            ))
            .unwrap();
        store
            .commit_revenue(&aggregate_revenue(
                Granularity::Hourly,
                RunMode::FullRebuild,
                &[],
                false,
            ))
            .unwrap();

        assert!(store
            .get_revenue_buckets(Granularity::Hourly, None)
            .unwrap()
            .is_empty());
        assert_eq!(
            store.get_revenue_watermark(Granularity::Hourly).unwrap(),
            None
        );
    }

    #[test]
    fn test_watermark_falls_back_to_max_bucket() {
        let test = create_test_store();
        let store = &test.store;
        store
            .commit_revenue(&aggregate_revenue(
                Granularity::Daily,
                RunMode::FullRebuild,
                &[purchase(day(24), 5.0)],
                false,
            ))
            .unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "DELETE FROM pipeline_state WHERE key = ?1",
                params![revenue_watermark_key(Granularity::Daily)],
            )
            .unwrap();

        assert_eq!(
            store.get_revenue_watermark(Granularity::Daily).unwrap(),
            Some(day(24))
        );
    }

    #[test]
    fn test_product_kpis_replace_and_get() {
        let test = create_test_store();
        let store = &test.store;

        store.replace_product_kpis(&[kpi("B"), kpi("A")]).unwrap();
        let ids: Vec<_> = store
            .get_product_kpis()
            .unwrap()
            .into_iter()
            .map(|k| k.product_id)
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(store.get_product_kpi("A").unwrap(), Some(kpi("A")));

        store.replace_product_kpis(&[kpi("C")]).unwrap();
        assert_eq!(store.get_product_kpis().unwrap().len(), 1);
        assert_eq!(store.get_product_kpi("A").unwrap(), None);
    }

    #[test]
    fn test_failed_replace_keeps_previous_snapshot() {
        let test = create_test_store();
        let store = &test.store;
        store.replace_product_kpis(&[kpi("A")]).unwrap();

        assert!(store.replace_product_kpis(&[kpi("X"), kpi("X")]).is_err());
        assert_eq!(store.get_product_kpis().unwrap(), vec![kpi("A")]);
    }

    #[test]
    fn test_health_scores_ordered_by_score() {
        let test = create_test_store();
        let store = &test.store;
        let score = |id: &str, health: f64| ProductHealthScore {
            product_id: id.to_string(),
            product_name: id.to_string(),
            total_revenue: 1.0,
            avg_rating: 4.0,
            units_sold: 1,
            number_of_returns: 0,
            return_rate: Some(0.0),
            sales_rank_score: 0.0,
            rating_rank_score: 0.0,
            return_rank_score: 1.0,
            health_score: health,
        };
        store
            .replace_health_scores(&[score("A", 20.0), score("B", 80.0), score("C", 80.0)])
            .unwrap();

        let ids: Vec<_> = store
            .get_health_scores()
            .unwrap()
            .into_iter()
            .map(|s| s.product_id)
            .collect();
        assert_eq!(ids, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_trending_scores_roundtrip_null_score() {
        let test = create_test_store();
        let store = &test.store;
        let row = TrendingScore {
            product_id: "P1".to_string(),
            view_date: NaiveDate::from_ymd_opt(2025, 7, 26).unwrap(),
            daily_views: 0,
            seven_day_avg_views: 0.0,
            twenty_eight_day_avg_views: 0.0,
            trending_score: None,
        };
        store.replace_trending_scores(&[row.clone()]).unwrap();
        assert_eq!(store.get_trending_scores().unwrap(), vec![row]);
    }

    #[test]
    fn test_record_job_start_and_finish() {
        let test = create_test_store();
        let store = &test.store;

        let run_id = store.record_job_start("product_kpis", "manual").unwrap();
        let running = store.get_last_run("product_kpis").unwrap().unwrap();
        assert_eq!(running.id, run_id);
        assert_eq!(running.status, JobRunStatus::Running);
        assert!(running.finished_at.is_none());

        store
            .record_job_finish(run_id, JobRunStatus::Completed, None)
            .unwrap();

        let last = store.get_last_run("product_kpis").unwrap().unwrap();
        assert_eq!(last.status, JobRunStatus::Completed);
        assert_eq!(last.triggered_by, "manual");
        assert!(last.finished_at.is_some());
    }

    #[test]
    fn test_get_job_history_limit() {
        let test = create_test_store();
        let store = &test.store;
        for _ in 0..5 {
            let id = store.record_job_start("daily_revenue", "schedule").unwrap();
            store
                .record_job_finish(id, JobRunStatus::Completed, None)
                .unwrap();
        }
        assert_eq!(store.get_job_history("daily_revenue", 3).unwrap().len(), 3);
    }

    #[test]
    fn test_mark_stale_jobs_failed() {
        let test = create_test_store();
        let store = &test.store;
        store.record_job_start("hourly_revenue", "schedule").unwrap();
        store.record_job_start("trending_scores", "schedule").unwrap();

        assert_eq!(store.mark_stale_jobs_failed().unwrap(), 2);
        assert_eq!(store.mark_stale_jobs_failed().unwrap(), 0);
        let last = store.get_last_run("hourly_revenue").unwrap().unwrap();
        assert_eq!(last.status, JobRunStatus::Failed);
        assert!(last.error_message.unwrap().contains("interrupted"));
    }

    #[test]
    fn test_schedule_state_crud() {
        let test = create_test_store();
        let store = &test.store;
        assert!(store.get_schedule_state("product_kpis").unwrap().is_none());

        let next = day(27);
        store
            .update_schedule_state(&JobScheduleState {
                job_id: "product_kpis".to_string(),
                next_run_at: next,
                last_run_at: None,
            })
            .unwrap();
        let state = store.get_schedule_state("product_kpis").unwrap().unwrap();
        assert_eq!(state.next_run_at, next);
        assert!(state.last_run_at.is_none());

        store
            .update_schedule_state(&JobScheduleState {
                job_id: "product_kpis".to_string(),
                next_run_at: day(28),
                last_run_at: Some(next),
            })
            .unwrap();
        assert_eq!(
            store
                .get_schedule_state("product_kpis")
                .unwrap()
                .unwrap()
                .last_run_at,
            Some(next)
        );
    }
}
