//! SQLite schema for the append-only event log.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

/// Events table. `event_id` is indexed but not unique: the log stores what
/// upstream delivered, duplicates included.
const EVENTS_TABLE_V1: Table = Table {
    name: "events",
    columns: &[
        sqlite_column!("seq", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("event_id", &SqlType::Text, non_null = true),
        // Unix microseconds, UTC
        sqlite_column!("event_timestamp", &SqlType::Integer, non_null = true),
        sqlite_column!("event_type", &SqlType::Text, non_null = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("session_id", &SqlType::Text, non_null = true),
        sqlite_column!("product_id", &SqlType::Text, non_null = true),
        sqlite_column!("sale_price", &SqlType::Real),
        sqlite_column!("quantity", &SqlType::Integer, non_null = true),
        sqlite_column!("on_sale", &SqlType::Integer, non_null = true),
        sqlite_column!("rating", &SqlType::Integer),
        sqlite_column!("source", &SqlType::Text),
    ],
    indices: &[
        ("idx_events_type_timestamp", "event_type, event_timestamp"),
        ("idx_events_event_id", "event_id"),
    ],
    unique_constraints: &[],
};

pub const EVENTS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[EVENTS_TABLE_V1],
    migration: None,
}];
