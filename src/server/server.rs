use anyhow::{Context, Result};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::metrics::metrics_handler;
use super::{log_requests, state::*};
use crate::analytics::Granularity;
use crate::background_jobs::{JobError, JobInfo, JobRunInfo};

#[derive(Serialize)]
struct ServerStats {
    pub version: &'static str,
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn internal_error(err: anyhow::Error) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err)).into_response()
}

#[derive(Deserialize, Debug)]
struct RevenueQuery {
    pub since: Option<DateTime<Utc>>,
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        version: env!("CARGO_PKG_VERSION"),
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

async fn get_revenue(
    State(store): State<GuardedMetricsStore>,
    Path(granularity): Path<String>,
    Query(query): Query<RevenueQuery>,
) -> Response {
    let Some(granularity) = Granularity::parse(&granularity) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("Unknown granularity '{}', expected hourly or daily", granularity),
        )
            .into_response();
    };
    match store.get_revenue_buckets(granularity, query.since) {
        Ok(buckets) => Json(buckets).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn get_product_kpis(State(store): State<GuardedMetricsStore>) -> Response {
    match store.get_product_kpis() {
        Ok(kpis) => Json(kpis).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn get_product_kpi(
    State(store): State<GuardedMetricsStore>,
    Path(id): Path<String>,
) -> Response {
    match store.get_product_kpi(&id) {
        Ok(Some(kpi)) => Json(kpi).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => internal_error(err),
    }
}

async fn get_health_scores(State(store): State<GuardedMetricsStore>) -> Response {
    match store.get_health_scores() {
        Ok(scores) => Json(scores).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn get_trending_scores(State(store): State<GuardedMetricsStore>) -> Response {
    match store.get_trending_scores() {
        Ok(scores) => Json(scores).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn list_jobs(State(scheduler): State<OptionalSchedulerHandle>) -> Response {
    let Some(scheduler) = scheduler else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    match scheduler.list_jobs().await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => internal_error(err),
    }
}

const JOB_HISTORY_LIMIT: usize = 20;

#[derive(Serialize)]
struct JobDetail {
    #[serde(flatten)]
    job: JobInfo,
    history: Vec<JobRunInfo>,
}

async fn get_job(
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(id): Path<String>,
) -> Response {
    let Some(scheduler) = scheduler else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let job = match scheduler.get_job(&id).await {
        Ok(Some(job)) => job,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => return internal_error(err),
    };
    match scheduler.get_job_history(&id, JOB_HISTORY_LIMIT) {
        Ok(history) => Json(JobDetail { job, history }).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn trigger_job(
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(id): Path<String>,
    params: Option<Json<JsonValue>>,
) -> Response {
    let Some(scheduler) = scheduler else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    match scheduler.trigger_job(&id, params.map(|Json(p)| p)).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(JobError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(err @ (JobError::AlreadyRunning | JobError::BlockedByDependency(_))) => {
            (StatusCode::CONFLICT, err.to_string()).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

pub fn make_app(state: ServerState) -> Router {
    let product_routes: Router<ServerState> = Router::new()
        .route("/kpis", get(get_product_kpis))
        .route("/{id}/kpis", get(get_product_kpi))
        .route("/health", get(get_health_scores))
        .route("/trending", get(get_trending_scores));

    let job_routes: Router<ServerState> = Router::new()
        .route("/", get(list_jobs))
        .route("/{id}", get(get_job))
        .route("/{id}/trigger", post(trigger_job));

    Router::new()
        .route("/", get(home))
        .route("/v1/revenue/{granularity}", get(get_revenue))
        .nest("/v1/products", product_routes)
        .nest("/v1/jobs", job_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve the API and the Prometheus endpoint until `shutdown_token` fires.
pub async fn run_server(state: ServerState, shutdown_token: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let metrics_port = state.config.metrics_port;

    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;
    let metrics_token = shutdown_token.clone();
    tokio::spawn(async move {
        let result = axum::serve(metrics_listener, make_metrics_app())
            .with_graceful_shutdown(async move { metrics_token.cancelled().await })
            .await;
        if let Err(e) = result {
            warn!("Metrics server stopped with error: {}", e);
        }
    });
    info!("Metrics available at port {}", metrics_port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Ready to serve at port {}", port);

    axum::serve(listener, make_app(state))
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;
    Ok(())
}
