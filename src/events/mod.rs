//! The event log the engine reads from.
//!
//! The log is owned by the upstream feed; the engine only needs the single
//! read capability of [`EventStore::read_events`]. Appending is exposed for
//! the NDJSON importer and for tests.

mod import;
mod models;
mod schema;
mod sqlite_event_store;

pub use import::{import_ndjson, ImportSummary};
pub use models::{Event, EventType};
pub use schema::EVENTS_VERSIONED_SCHEMAS;
pub use sqlite_event_store::SqliteEventStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

pub trait EventStore: Send + Sync {
    /// Read every event of `event_type` with `event_timestamp >= since`.
    /// `None` means the whole history. Results are ordered by timestamp.
    fn read_events(
        &self,
        event_type: EventType,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>>;

    /// Append events to the log. Returns the number of rows written.
    fn append_events(&self, events: &[Event]) -> Result<usize>;

    /// Number of events stored per type, for diagnostics.
    fn count_by_type(&self) -> Result<Vec<(EventType, u64)>>;
}
