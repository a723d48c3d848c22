use super::context::JobContext;
use super::handle::{SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, HookEvent, JobError};
use super::runner::{finish_run, start_run};
use crate::metrics_store::{JobScheduleState, MetricsStore};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sent by a finished job task back to the scheduler loop.
struct JobCompletion {
    job_id: String,
    succeeded: bool,
}

/// Manages background job scheduling and execution.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Currently running jobs with their task handles
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Cancellation tokens for each running job.
    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Store for persisting job history and schedules.
    metrics_store: Arc<dyn MetricsStore>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    completion_sender: mpsc::UnboundedSender<JobCompletion>,
    completion_receiver: mpsc::UnboundedReceiver<JobCompletion>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,
}

impl JobScheduler {
    fn new(
        metrics_store: Arc<dyn MetricsStore>,
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        let (completion_sender, completion_receiver) = mpsc::unbounded_channel();
        Self {
            shared_state,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            metrics_store,
            command_receiver,
            completion_sender,
            completion_receiver,
            shutdown_token,
            job_context,
        }
    }

    /// Register a job with the scheduler.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!("Registering job: {} - {}", job_id, job.description());
        let mut state = self.shared_state.write().await;
        state.registered.insert(job_id, job);
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.registered.len()
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        match self.metrics_store.mark_stale_jobs_failed() {
            Ok(count) if count > 0 => {
                info!("Marked {} stale jobs as failed from previous run", count);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to mark stale jobs: {}", e);
            }
        }

        loop {
            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                Some(done) = self.completion_receiver.recv() => {
                    self.on_job_completed(done).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::Trigger {
                job_id,
                params,
                reply,
            } => {
                let result = self.spawn_job(&job_id, "manual", params).await;
                let _ = reply.send(result);
            }
        }
    }

    /// First dependency of `job` that is currently running, if any.
    fn running_dependency(state: &SharedJobState, job: &dyn BackgroundJob) -> Option<String> {
        job.depends_on()
            .iter()
            .find(|dep| state.running.contains(**dep))
            .map(|dep| dep.to_string())
    }

    /// Calculate time until the next scheduled job should run.
    async fn time_until_next_scheduled_job(&self) -> Duration {
        let mut min_duration = Duration::from_secs(60);
        let now = Utc::now();

        let state = self.shared_state.read().await;
        for (job_id, job) in &state.registered {
            if state.running.contains(job_id)
                || Self::running_dependency(&state, job.as_ref()).is_some()
            {
                // Completion of the running job wakes the loop
                continue;
            }

            if let Some(next_run) = self.get_next_run_time(job_id, job.as_ref(), now) {
                if next_run > now {
                    let duration = (next_run - now).to_std().unwrap_or(Duration::from_secs(1));
                    if duration < min_duration {
                        min_duration = duration;
                    }
                } else {
                    return Duration::from_secs(0);
                }
            }
        }

        min_duration
    }

    /// Next run time of an interval job, `None` for hook-only jobs.
    ///
    /// A job without stored schedule state is due at `now`, so callers must
    /// compare against the same `now` they pass in.
    fn get_next_run_time(
        &self,
        job_id: &str,
        job: &dyn BackgroundJob,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        job.schedule().interval()?;
        match self.metrics_store.get_schedule_state(job_id) {
            Ok(Some(state)) => Some(state.next_run_at),
            Ok(None) => Some(now),
            Err(e) => {
                warn!("Failed to read schedule state for {}: {}", job_id, e);
                None
            }
        }
    }

    async fn run_due_jobs(&mut self) {
        let now = Utc::now();
        let mut jobs_to_run = Vec::new();

        {
            let state = self.shared_state.read().await;
            for (job_id, job) in &state.registered {
                if state.running.contains(job_id) {
                    continue;
                }
                if let Some(next_run) = self.get_next_run_time(job_id, job.as_ref(), now) {
                    if next_run <= now {
                        jobs_to_run.push(job_id.clone());
                    }
                }
            }
        }

        for job_id in jobs_to_run {
            if let Err(e) = self.spawn_job(&job_id, "schedule", None).await {
                debug!("Scheduled run of {} deferred: {}", job_id, e);
            }
        }
    }

    /// Trigger all jobs that listen for a specific hook event.
    async fn trigger_jobs_for_hook(&mut self, event: HookEvent) {
        let jobs_to_trigger: Vec<String> = {
            let state = self.shared_state.read().await;
            state
                .registered
                .iter()
                .filter(|(_, job)| job.schedule().listens_to(event))
                .map(|(job_id, _)| job_id.clone())
                .collect()
        };

        let trigger = format!("hook:{}", event);
        for job_id in jobs_to_trigger {
            if let Err(e) = self.spawn_job(&job_id, &trigger, None).await {
                debug!("Skipping hook trigger for {}: {}", job_id, e);
            }
        }
    }

    /// Spawn a job execution task.
    async fn spawn_job(
        &mut self,
        job_id: &str,
        triggered_by: &str,
        params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        let job = {
            let mut state = self.shared_state.write().await;
            let job = state.registered.get(job_id).cloned().ok_or(JobError::NotFound)?;
            if state.running.contains(job_id) {
                return Err(JobError::AlreadyRunning);
            }
            if let Some(dep) = Self::running_dependency(&state, job.as_ref()) {
                return Err(JobError::BlockedByDependency(dep));
            }
            state.running.insert(job_id.to_string());
            job
        };

        let run_id = match start_run(self.metrics_store.as_ref(), job_id, triggered_by) {
            Ok(id) => id,
            Err(e) => {
                self.shared_state.write().await.running.remove(job_id);
                return Err(e);
            }
        };

        // Push next_run_at forward now so a long run does not retrigger itself
        if let Some(interval) = job.schedule().interval() {
            let next_run =
                Utc::now() + chrono::Duration::from_std(interval).unwrap_or_default();
            let schedule_state = JobScheduleState {
                job_id: job_id.to_string(),
                next_run_at: next_run,
                last_run_at: None,
            };
            if let Err(e) = self.metrics_store.update_schedule_state(&schedule_state) {
                warn!("Failed to initialize schedule state for {}: {}", job_id, e);
            }
        }

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());
        let ctx = self.job_context.with_token(cancel_token);

        let metrics_store = Arc::clone(&self.metrics_store);
        let shared_state = Arc::clone(&self.shared_state);
        let completion_sender = self.completion_sender.clone();
        let job_id_owned = job_id.to_string();

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result =
                tokio::task::spawn_blocking(move || job.execute_with_params(&ctx, params)).await;
            let elapsed = start_time.elapsed();

            let succeeded = matches!(result, Ok(Ok(())));
            let outcome = result.as_ref().map_err(|e| e.to_string());
            finish_run(
                metrics_store.as_ref(),
                run_id,
                &job_id_owned,
                outcome,
                elapsed,
            );

            shared_state.write().await.running.remove(&job_id_owned);
            let _ = completion_sender.send(JobCompletion {
                job_id: job_id_owned,
                succeeded,
            });
        });

        self.running_handles.insert(job_id.to_string(), handle);
        Ok(())
    }

    async fn on_job_completed(&mut self, done: JobCompletion) {
        if let Some(handle) = self.running_handles.remove(&done.job_id) {
            let _ = handle.await;
        }
        self.job_cancel_tokens.remove(&done.job_id);

        let job = {
            let state = self.shared_state.read().await;
            match state.registered.get(&done.job_id) {
                Some(job) => Arc::clone(job),
                None => return,
            }
        };

        if let Some(interval) = job.schedule().interval() {
            let now = Utc::now();
            let state = JobScheduleState {
                job_id: done.job_id.clone(),
                next_run_at: now + chrono::Duration::from_std(interval).unwrap_or_default(),
                last_run_at: Some(now),
            };
            if let Err(e) = self.metrics_store.update_schedule_state(&state) {
                error!("Failed to update schedule state for {}: {}", done.job_id, e);
            }
        }

        if done.succeeded {
            if let Some(hook) = job.completion_hook() {
                debug!("Job {} fired hook {}", done.job_id, hook);
                self.trigger_jobs_for_hook(hook).await;
            }
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        // A cancelled run commits nothing
        for (job_id, token) in &self.job_cancel_tokens {
            debug!("Cancelling job: {}", job_id);
            token.cancel();
        }

        for (job_id, handle) in self.running_handles.drain() {
            if tokio::time::timeout(Duration::from_secs(30), handle)
                .await
                .is_err()
            {
                warn!("Job {} did not stop within 30s", job_id);
            }
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    metrics_store: Arc<dyn MetricsStore>,
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState {
        registered: HashMap::new(),
        running: HashSet::new(),
    }));

    let scheduler = JobScheduler::new(
        metrics_store.clone(),
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&shared_state),
    );

    let handle = SchedulerHandle::new(command_tx, shared_state, metrics_store);

    (scheduler, handle)
}
