use axum::extract::FromRef;

use crate::background_jobs::SchedulerHandle;
use crate::metrics_store::MetricsStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedMetricsStore = Arc<dyn MetricsStore>;
pub type OptionalSchedulerHandle = Option<SchedulerHandle>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub metrics_store: GuardedMetricsStore,
    pub scheduler_handle: OptionalSchedulerHandle,
    pub hash: String,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        metrics_store: GuardedMetricsStore,
        scheduler_handle: OptionalSchedulerHandle,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            metrics_store,
            scheduler_handle,
            hash: env!("GIT_HASH").to_string(),
        }
    }
}

impl FromRef<ServerState> for GuardedMetricsStore {
    fn from_ref(input: &ServerState) -> Self {
        input.metrics_store.clone()
    }
}

impl FromRef<ServerState> for OptionalSchedulerHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler_handle.clone()
    }
}
