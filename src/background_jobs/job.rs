use super::context::JobContext;
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

/// Schedule for when a job should run.
#[derive(Debug, Clone)]
pub enum JobSchedule {
    /// Run at fixed intervals
    Interval(Duration),
    /// Run only in response to hooks
    Hook(HookEvent),
}

impl JobSchedule {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            JobSchedule::Interval(interval) => Some(*interval),
            JobSchedule::Hook(_) => None,
        }
    }

    pub fn listens_to(&self, event: HookEvent) -> bool {
        match self {
            JobSchedule::Hook(hook) => *hook == event,
            JobSchedule::Interval(_) => false,
        }
    }
}

/// Events that can trigger hook-based jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// A fresh `product_kpis` snapshot was committed.
    ProductKpisCommitted,
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookEvent::ProductKpisCommitted => write!(f, "ProductKpisCommitted"),
        }
    }
}

/// Errors that can occur during job execution.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound,
    #[error("Job is already running")]
    AlreadyRunning,
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Job was cancelled")]
    Cancelled,
    #[error("Job is blocked by running dependency '{0}'")]
    BlockedByDependency(String),
}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        JobError::ExecutionFailed(format!("{:#}", e))
    }
}

/// Trait for background jobs.
///
/// Jobs are executed synchronously in a blocking context. A job reads its
/// inputs, computes, and commits its output in one atomic write at the end,
/// so returning early (error or cancellation) leaves the previous output
/// untouched.
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// When this job should be scheduled to run.
    fn schedule(&self) -> JobSchedule;

    /// Jobs that must not be running when this one starts.
    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    /// Hook fired by the scheduler after a successful run.
    fn completion_hook(&self) -> Option<HookEvent> {
        None
    }

    /// Execute the job.
    ///
    /// Called from `spawn_blocking`. Implementations check `ctx.is_cancelled()`
    /// between phases and return `JobError::Cancelled` before committing.
    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;

    /// Execute the job with optional parameters from a manual trigger.
    ///
    /// The default implementation ignores the parameters.
    fn execute_with_params(
        &self,
        ctx: &JobContext,
        _params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        self.execute(ctx)
    }
}
