//! Run bookkeeping shared by the scheduler and one-shot CLI runs.

use super::context::JobContext;
use super::job::{BackgroundJob, JobError};
use crate::metrics_store::{JobRunStatus, MetricsStore};
use crate::server::metrics;
use serde_json::Value as JsonValue;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Record the start of a run and flag the job as running.
pub fn start_run(
    store: &dyn MetricsStore,
    job_id: &str,
    triggered_by: &str,
) -> Result<i64, JobError> {
    let run_id = store
        .record_job_start(job_id, triggered_by)
        .map_err(|e| JobError::ExecutionFailed(format!("Failed to record job start: {}", e)))?;
    info!(
        "Starting job: {} (run_id: {}, triggered_by: {})",
        job_id, run_id, triggered_by
    );
    metrics::set_background_job_running(job_id, true);
    Ok(run_id)
}

/// Record how a run ended. `outcome` is `Err(message)` for task panics.
pub fn finish_run(
    store: &dyn MetricsStore,
    run_id: i64,
    job_id: &str,
    outcome: Result<&Result<(), JobError>, String>,
    elapsed: Duration,
) {
    let (status, error_msg, status_label) = match outcome {
        Ok(Ok(())) => {
            info!("Job {} completed successfully in {:?}", job_id, elapsed);
            (JobRunStatus::Completed, None, "success")
        }
        Ok(Err(JobError::Cancelled)) => {
            info!("Job {} was cancelled after {:?}", job_id, elapsed);
            (
                JobRunStatus::Cancelled,
                Some("Cancelled".to_string()),
                "cancelled",
            )
        }
        Ok(Err(e)) => {
            error!("Job {} failed after {:?}: {}", job_id, elapsed, e);
            (JobRunStatus::Failed, Some(e.to_string()), "failed")
        }
        Err(panic_msg) => {
            error!("Job {} panicked after {:?}: {}", job_id, elapsed, panic_msg);
            (
                JobRunStatus::Failed,
                Some(format!("Task panic: {}", panic_msg)),
                "panic",
            )
        }
    };

    metrics::record_background_job_execution(job_id, status_label, elapsed);
    metrics::set_background_job_running(job_id, false);

    if let Err(e) = store.record_job_finish(run_id, status, error_msg) {
        error!("Failed to record job finish for {}: {}", job_id, e);
    }
}

/// Run a job to completion on the current thread, recording the run.
pub fn run_job(
    job: &dyn BackgroundJob,
    ctx: &JobContext,
    params: Option<JsonValue>,
    triggered_by: &str,
) -> Result<(), JobError> {
    let run_id = start_run(ctx.metrics_store.as_ref(), job.id(), triggered_by)?;
    let start_time = Instant::now();
    let result = job.execute_with_params(ctx, params);
    finish_run(
        ctx.metrics_store.as_ref(),
        run_id,
        job.id(),
        Ok(&result),
        start_time.elapsed(),
    );
    result
}
