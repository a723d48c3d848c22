use super::job::{BackgroundJob, JobError, JobSchedule};
use crate::metrics_store::{JobRun, JobRunStatus, MetricsStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// A registered job as reported by `/v1/jobs`.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub schedule: JobScheduleInfo,
    pub depends_on: Vec<String>,
    pub is_running: bool,
    pub last_run: Option<JobRunInfo>,
    pub next_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobScheduleInfo {
    Interval {
        every_secs: u64,
    },
    Hook {
        hook: String,
    },
}

impl From<JobSchedule> for JobScheduleInfo {
    fn from(schedule: JobSchedule) -> Self {
        match schedule {
            JobSchedule::Interval(every) => JobScheduleInfo::Interval {
                every_secs: every.as_secs(),
            },
            JobSchedule::Hook(event) => JobScheduleInfo::Hook {
                hook: event.to_string(),
            },
        }
    }
}

/// One recorded run, without the store's row id.
#[derive(Debug, Clone, Serialize)]
pub struct JobRunInfo {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: JobRunStatus,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

impl From<JobRun> for JobRunInfo {
    fn from(run: JobRun) -> Self {
        let duration_ms = run
            .finished_at
            .map(|finished| (finished - run.started_at).num_milliseconds());
        JobRunInfo {
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_ms,
            status: run.status,
            error_message: run.error_message,
            triggered_by: run.triggered_by,
        }
    }
}

pub enum SchedulerCommand {
    Trigger {
        job_id: String,
        params: Option<JsonValue>,
        reply: oneshot::Sender<Result<(), JobError>>,
    },
}

/// Registry and running set, written by the scheduler loop and read by handles.
pub struct SharedJobState {
    pub registered: HashMap<String, Arc<dyn BackgroundJob>>,
    pub running: HashSet<String>,
}

/// Cloneable front of the scheduler used by the HTTP layer.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    shared_state: Arc<RwLock<SharedJobState>>,
    metrics_store: Arc<dyn MetricsStore>,
}

impl SchedulerHandle {
    pub fn new(
        commands: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
        metrics_store: Arc<dyn MetricsStore>,
    ) -> Self {
        Self {
            commands,
            shared_state,
            metrics_store,
        }
    }

    fn describe(&self, state: &SharedJobState, job_id: &str) -> Result<Option<JobInfo>> {
        let Some(job) = state.registered.get(job_id) else {
            return Ok(None);
        };
        let last_run = self.metrics_store.get_last_run(job_id)?;
        let schedule_state = self.metrics_store.get_schedule_state(job_id)?;

        Ok(Some(JobInfo {
            id: job_id.to_string(),
            name: job.name().to_string(),
            description: job.description().to_string(),
            schedule: job.schedule().into(),
            depends_on: job.depends_on().iter().map(|d| d.to_string()).collect(),
            is_running: state.running.contains(job_id),
            last_run: last_run.map(JobRunInfo::from),
            next_run_at: schedule_state.map(|s| s.next_run_at),
        }))
    }

    /// All registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Result<Vec<JobInfo>> {
        let state = self.shared_state.read().await;
        let mut ids: Vec<&String> = state.registered.keys().collect();
        ids.sort();

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            jobs.extend(self.describe(&state, id)?);
        }
        Ok(jobs)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobInfo>> {
        let state = self.shared_state.read().await;
        self.describe(&state, job_id)
    }

    /// Ask the scheduler loop to start `job_id` now and wait for its verdict.
    ///
    /// Returns once the run was accepted or refused; it does not wait for the
    /// job itself to finish.
    pub async fn trigger_job(
        &self,
        job_id: &str,
        params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        let (reply, verdict) = oneshot::channel();
        let command = SchedulerCommand::Trigger {
            job_id: job_id.to_string(),
            params,
            reply,
        };

        if self.commands.send(command).await.is_err() {
            return Err(JobError::ExecutionFailed(
                "scheduler is shut down".to_string(),
            ));
        }
        verdict.await.unwrap_or_else(|_| {
            Err(JobError::ExecutionFailed(
                "scheduler dropped the trigger".to_string(),
            ))
        })
    }

    /// Most recent runs first.
    pub fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRunInfo>> {
        Ok(self
            .metrics_store
            .get_job_history(job_id, limit)?
            .into_iter()
            .map(JobRunInfo::from)
            .collect())
    }
}
