use super::models::{Event, EventType};
use super::schema::EVENTS_VERSIONED_SCHEMAS;
use super::EventStore;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const EVENT_COLUMNS: &str = "event_id, event_timestamp, event_type, user_id, session_id, \
     product_id, sale_price, quantity, on_sale, rating, source";

pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, EVENTS_VERSIONED_SCHEMAS, "events")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        EVENTS_VERSIONED_SCHEMAS
            .last()
            .context("No events schema defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Events database connection lock poisoned"))
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
        let micros: i64 = row.get("event_timestamp")?;
        let event_timestamp = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(1, "event_timestamp".to_string(), Type::Integer)
        })?;
        let type_str: String = row.get("event_type")?;
        let event_type = EventType::parse(&type_str).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(2, "event_type".to_string(), Type::Text)
        })?;

        Ok(Event {
            event_id: row.get("event_id")?,
            event_timestamp,
            event_type,
            user_id: row.get("user_id")?,
            session_id: row.get("session_id")?,
            product_id: row.get("product_id")?,
            sale_price: row.get("sale_price")?,
            quantity: row.get("quantity")?,
            on_sale: row.get::<_, i64>("on_sale")? != 0,
            rating: row.get("rating")?,
            source: row.get("source")?,
        })
    }
}

impl EventStore for SqliteEventStore {
    fn read_events(
        &self,
        event_type: EventType,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        let lower_bound = since.map(|ts| ts.timestamp_micros()).unwrap_or(i64::MIN);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM events
             WHERE event_type = ?1 AND event_timestamp >= ?2
             ORDER BY event_timestamp, seq",
            EVENT_COLUMNS
        ))?;
        let events = stmt
            .query_map(params![event_type.as_str(), lower_bound], Self::row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read {} events", event_type))?;

        debug!(
            "Read {} {} events since {:?}",
            events.len(),
            event_type,
            since
        );
        Ok(events)
    }

    fn append_events(&self, events: &[Event]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO events ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                EVENT_COLUMNS
            ))?;
            for event in events {
                stmt.execute(params![
                    event.event_id,
                    event.event_timestamp.timestamp_micros(),
                    event.event_type.as_str(),
                    event.user_id,
                    event.session_id,
                    event.product_id,
                    event.sale_price,
                    event.quantity,
                    event.on_sale as i64,
                    event.rating,
                    event.source,
                ])?;
            }
        }
        tx.commit().context("Failed to commit appended events")?;
        Ok(events.len())
    }

    fn count_by_type(&self) -> Result<Vec<(EventType, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT event_type, COUNT(*) FROM events GROUP BY event_type ORDER BY event_type",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(t, count)| EventType::parse(&t).map(|t| (t, count as u64)))
            .collect())
    }
}
