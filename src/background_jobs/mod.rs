//! Background job scheduling and execution system.
//!
//! Every derived table is produced by a job. The scheduler runs jobs on
//! intervals and hook events, keeps a job from overlapping itself or its
//! dependencies, and persists run history in the metrics store.

mod context;
mod handle;
mod job;
pub mod jobs;
mod runner;
mod scheduler;

pub use context::JobContext;
pub use handle::{JobInfo, JobRunInfo, JobScheduleInfo, SchedulerHandle};
pub use job::{BackgroundJob, HookEvent, JobError, JobSchedule};
pub use runner::run_job;
pub use scheduler::{create_scheduler, JobScheduler};
