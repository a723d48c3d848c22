use crate::analytics::Granularity;
use axum::{http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all engine metrics
const PREFIX: &str = "commerce_metrics";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_background_job_executions_total"),
            "Background job runs by outcome"
        ),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job run duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "1 while a job is running"),
        &["job_id"]
    ).expect("Failed to create background_job_running metric");

    // Output Metrics
    pub static ref ROWS_COMMITTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_rows_committed_total"), "Rows written to derived tables"),
        &["table"]
    ).expect("Failed to create rows_committed_total metric");

    pub static ref REVENUE_WATERMARK_SECONDS: GaugeVec = GaugeVec::new(
        Opts::new(
            format!("{PREFIX}_revenue_watermark_seconds"),
            "Committed revenue watermark as unix seconds"
        ),
        &["granularity"]
    ).expect("Failed to create revenue_watermark_seconds metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(ROWS_COMMITTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(REVENUE_WATERMARK_SECONDS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record a finished job run. `status` is one of success/failed/cancelled/panic.
pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();

    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_rows_committed(table: &str, rows: usize) {
    ROWS_COMMITTED_TOTAL
        .with_label_values(&[table])
        .inc_by(rows as f64);
}

pub fn set_revenue_watermark(granularity: Granularity, watermark: DateTime<Utc>) {
    REVENUE_WATERMARK_SECONDS
        .with_label_values(&[granularity.as_str()])
        .set(watermark.timestamp() as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn find_family(name: &str) -> Option<prometheus::proto::MetricFamily> {
        REGISTRY
            .gather()
            .into_iter()
            .find(|m| m.get_name() == name)
    }

    #[test]
    fn test_metrics_initialization() {
        init_metrics();
        // Vec metrics only show up in gather() once a label set was touched
        record_rows_committed("product_kpis", 0);
        assert!(find_family("commerce_metrics_rows_committed_total").is_some());
    }

    #[test]
    fn test_record_http_request() {
        init_metrics();
        record_http_request("GET", "/v1/products/kpis", 200, Duration::from_millis(50));
        assert!(find_family("commerce_metrics_http_requests_total").is_some());
    }

    #[test]
    fn test_job_metrics() {
        init_metrics();
        set_background_job_running("test_metrics_job", true);
        assert_eq!(
            BACKGROUND_JOB_RUNNING
                .with_label_values(&["test_metrics_job"])
                .get(),
            1.0
        );

        record_background_job_execution("test_metrics_job", "success", Duration::from_secs(2));
        set_background_job_running("test_metrics_job", false);
        assert_eq!(
            BACKGROUND_JOB_RUNNING
                .with_label_values(&["test_metrics_job"])
                .get(),
            0.0
        );
        assert!(
            BACKGROUND_JOB_EXECUTIONS_TOTAL
                .with_label_values(&["test_metrics_job", "success"])
                .get()
                >= 1.0
        );
    }

    #[test]
    fn test_revenue_watermark_gauge() {
        init_metrics();
        let watermark = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        set_revenue_watermark(Granularity::Hourly, watermark);
        assert_eq!(
            REVENUE_WATERMARK_SECONDS
                .with_label_values(&["hourly"])
                .get(),
            watermark.timestamp() as f64
        );
    }
}
