//! Isolated engine environment for a single test.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use commerce_metrics_engine::background_jobs::{
    create_scheduler, jobs::build_jobs, run_job, JobContext, JobError, SchedulerHandle,
};
use commerce_metrics_engine::catalog::{Product, SqliteCatalogStore};
use commerce_metrics_engine::config::{AppConfig, CliConfig, FileConfig};
use commerce_metrics_engine::events::{Event, EventStore, SqliteEventStore};
use commerce_metrics_engine::server::{make_app, ServerConfig, ServerState};
use commerce_metrics_engine::SqliteMetricsStore;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub struct TestEnv {
    pub events: Arc<SqliteEventStore>,
    pub catalog: Arc<SqliteCatalogStore>,
    pub metrics: Arc<SqliteMetricsStore>,
    pub config: AppConfig,
    db_dir: TempDir,
}

/// A scheduler running in the background, stopped on drop.
pub struct RunningScheduler {
    pub handle: SchedulerHandle,
    pub app: Router,
    shutdown_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Drop for RunningScheduler {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl RunningScheduler {
    /// Wait until every job, hook-driven ones included, finished at least once.
    pub async fn wait_until_idle(&self) {
        for _ in 0..250 {
            let jobs = self.handle.list_jobs().await.unwrap();
            let settled = jobs
                .iter()
                .all(|job| !job.is_running && job.last_run.is_some());
            if settled {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("scheduler did not settle");
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_file_config(FileConfig::default())
    }

    pub fn with_file_config(file_config: FileConfig) -> Self {
        let db_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(db_dir.path().to_path_buf()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        Self {
            events: Arc::new(SqliteEventStore::new(config.events_db_path()).unwrap()),
            catalog: Arc::new(SqliteCatalogStore::new(config.catalog_db_path()).unwrap()),
            metrics: Arc::new(SqliteMetricsStore::new(config.metrics_db_path()).unwrap()),
            config,
            db_dir,
        }
    }

    pub fn db_dir(&self) -> &Path {
        self.db_dir.path()
    }

    pub fn context(&self) -> JobContext {
        JobContext::new(
            CancellationToken::new(),
            self.events.clone(),
            self.catalog.clone(),
            self.metrics.clone(),
        )
    }

    pub fn append(&self, events: Vec<Event>) {
        self.events.append_events(&events).unwrap();
    }

    pub fn seed_catalog(&self, products: Vec<Product>) {
        self.catalog.replace_products(&products).unwrap();
    }

    pub fn run_with_params(&self, job_id: &str, params: Option<JsonValue>) -> Result<(), JobError> {
        let job = build_jobs(&self.config)
            .into_iter()
            .find(|job| job.id() == job_id)
            .unwrap_or_else(|| panic!("unknown job {}", job_id));
        run_job(job.as_ref(), &self.context(), params, "test")
    }

    pub fn run(&self, job_id: &str) -> Result<(), JobError> {
        self.run_with_params(job_id, None)
    }

    /// Run every job once, KPIs before health.
    pub fn run_all(&self) {
        for job in build_jobs(&self.config) {
            run_job(job.as_ref(), &self.context(), None, "test").unwrap();
        }
    }

    /// Router without a scheduler attached.
    pub fn app(&self) -> Router {
        make_app(ServerState::new(
            ServerConfig::default(),
            self.metrics.clone(),
            None,
        ))
    }

    pub async fn spawn_scheduler(&self) -> RunningScheduler {
        let shutdown_token = CancellationToken::new();
        let ctx = JobContext::new(
            shutdown_token.child_token(),
            self.events.clone(),
            self.catalog.clone(),
            self.metrics.clone(),
        );
        let (mut scheduler, handle) =
            create_scheduler(self.metrics.clone(), shutdown_token.clone(), ctx);
        for job in build_jobs(&self.config) {
            scheduler.register_job(job).await;
        }
        let task = tokio::spawn(async move { scheduler.run().await });

        let app = make_app(ServerState::new(
            ServerConfig::default(),
            self.metrics.clone(),
            Some(handle.clone()),
        ));

        RunningScheduler {
            handle,
            app,
            shutdown_token,
            task: Some(task),
        }
    }
}

/// Send a request to the router and decode the JSON body (Null when empty).
pub async fn request_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, json)
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, JsonValue) {
    request_json(app, "GET", uri, None).await
}
