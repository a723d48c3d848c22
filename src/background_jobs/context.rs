use crate::catalog::CatalogSource;
use crate::events::EventStore;
use crate::metrics_store::MetricsStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
///
/// Contains the stores a run reads from and writes to, plus a cancellation
/// token for graceful shutdown handling.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Append-only event log.
    pub event_store: Arc<dyn EventStore>,

    /// Product catalog snapshot.
    pub catalog: Arc<dyn CatalogSource>,

    /// Derived tables, watermarks and job history.
    pub metrics_store: Arc<dyn MetricsStore>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        event_store: Arc<dyn EventStore>,
        catalog: Arc<dyn CatalogSource>,
        metrics_store: Arc<dyn MetricsStore>,
    ) -> Self {
        Self {
            cancellation_token,
            event_store,
            catalog,
            metrics_store,
        }
    }

    /// Same stores, different cancellation token.
    pub fn with_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            ..self.clone()
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
