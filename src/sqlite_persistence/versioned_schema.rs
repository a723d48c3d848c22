use anyhow::{bail, Context, Result};
use rusqlite::{params, types::Type, Connection};
use std::path::Path;
use tracing::info;

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

/// Offset added to schema versions when stored in `PRAGMA user_version`, so a
/// database created by another tool (user_version 0) is never mistaken for ours.
pub const BASE_DB_VERSION: usize = 99999;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
        }
    }

    fn parse(s: &str) -> Option<&'static SqlType> {
        match s {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            "REAL" => Some(&SqlType::Real),
            _ => None,
        }
    }
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<S>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let mut def = format!("{} {}", column.name, column.sql_type.as_sql());
                if column.is_primary_key {
                    def.push_str(" PRIMARY KEY");
                }
                if column.non_null {
                    def.push_str(" NOT NULL");
                }
                if let Some(default_value) = column.default_value {
                    def.push_str(&format!(" DEFAULT {}", default_value));
                }
                def
            })
            .chain(
                self.unique_constraints
                    .iter()
                    .map(|cols| format!("UNIQUE ({})", cols.join(", "))),
            )
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({});", self.name, columns)
    }

    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute(&self.create_sql(), params![])
            .with_context(|| format!("Failed to create table {}", self.name))?;
        for (index_name, columns) in self.indices {
            conn.execute(
                &format!("CREATE INDEX {} ON {}({});", index_name, self.name, columns),
                params![],
            )?;
        }
        Ok(())
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns = stmt
            .query_map(params![], |row| {
                let name: String = row.get(1)?;
                let type_name: String = row.get(2)?;
                let sql_type = SqlType::parse(&type_name).ok_or_else(|| {
                    rusqlite::Error::InvalidColumnType(2, type_name.clone(), Type::Text)
                })?;
                Ok(Column {
                    name,
                    sql_type,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get::<_, Option<String>>(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<rusqlite::Result<Vec<Column<'_, String>>>>()
            .with_context(|| format!("Failed to read columns of table {}", self.name))?;

        if actual_columns.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found: {}, expected: {}",
                self.name,
                actual_columns.len(),
                self.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in actual_columns.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    actual.name
                );
            }
            if actual.sql_type != expected.sql_type {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    actual.sql_type
                );
            }
            if actual.non_null != expected.non_null {
                bail!(
                    "Table {} column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.non_null,
                    actual.non_null
                );
            }
            // sqlite may report the default wrapped in parentheses
            if actual
                .default_value
                .as_ref()
                .map(strip_leading_and_trailing_parentheses)
                != expected
                    .default_value
                    .map(strip_leading_and_trailing_parentheses)
            {
                bail!(
                    "Table {} column {} default value mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.default_value,
                    actual.default_value
                );
            }
            if actual.is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.is_primary_key,
                    actual.is_primary_key
                );
            }
        }

        for (index_name, _) in self.indices {
            let index_exists: bool = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !index_exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

fn strip_leading_and_trailing_parentheses<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();
    if s.starts_with('(') && s.ends_with(')') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Opens (or creates) a database governed by `schemas`.
///
/// A fresh file gets the latest schema. An existing file is validated against
/// the schema of its recorded version and migrated forward inside a single
/// transaction. `label` only appears in logs and error messages.
pub fn open_versioned_db<P: AsRef<Path>>(
    db_path: P,
    schemas: &'static [VersionedSchema],
    label: &str,
) -> Result<Connection> {
    let path = db_path.as_ref();
    let is_new_db = !path.exists();
    let mut conn = Connection::open(path)
        .with_context(|| format!("Failed to open {} database at {:?}", label, path))?;
    let latest = schemas
        .last()
        .with_context(|| format!("No schema versions defined for {} database", label))?;

    if is_new_db {
        info!("Creating new {} database at {:?}", label, path);
        latest.create(&conn)?;
        return Ok(conn);
    }

    let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let db_version = raw_version - BASE_DB_VERSION as i64;
    if db_version < 1 {
        bail!(
            "{} database version {} is invalid (expected >= 1)",
            label,
            db_version
        );
    }

    let schema = schemas
        .iter()
        .find(|s| s.version as i64 == db_version)
        .with_context(|| format!("Unknown {} database version {}", label, db_version))?;
    schema.validate(&conn).with_context(|| {
        format!(
            "{} database schema validation failed for version {}",
            label, db_version
        )
    })?;

    if (db_version as usize) < latest.version {
        info!(
            "Migrating {} database from version {} to {}",
            label, db_version, latest.version
        );
        let tx = conn.transaction()?;
        for schema in schemas.iter().filter(|s| s.version > db_version as usize) {
            if let Some(migration_fn) = schema.migration {
                migration_fn(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest.version),
            [],
        )?;
        tx.commit()?;
    }

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_column;

    const ITEMS_V1: Table = Table {
        name: "items",
        columns: &[
            sqlite_column!("id", &SqlType::Text, is_primary_key = true),
            sqlite_column!("amount", &SqlType::Real, non_null = true),
        ],
        indices: &[("idx_items_amount", "amount")],
        unique_constraints: &[],
    };

    const ITEMS_V2: Table = Table {
        name: "items",
        columns: &[
            sqlite_column!("id", &SqlType::Text, is_primary_key = true),
            sqlite_column!("amount", &SqlType::Real, non_null = true),
            sqlite_column!(
                "created_at",
                &SqlType::Integer,
                non_null = true,
                default_value = Some("0")
            ),
        ],
        indices: &[("idx_items_amount", "amount")],
        unique_constraints: &[],
    };

    // ADD COLUMN only accepts a constant default
    fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
        conn.execute(
            "ALTER TABLE items ADD COLUMN created_at INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
        Ok(())
    }

    static SCHEMAS_V1_ONLY: &[VersionedSchema] = &[VersionedSchema {
        version: 1,
        tables: &[ITEMS_V1],
        migration: None,
    }];

    static SCHEMAS: &[VersionedSchema] = &[
        VersionedSchema {
            version: 1,
            tables: &[ITEMS_V1],
            migration: None,
        },
        VersionedSchema {
            version: 2,
            tables: &[ITEMS_V2],
            migration: Some(migrate_v1_to_v2),
        },
    ];

    #[test]
    fn test_create_sql_includes_constraints() {
        let sql = ITEMS_V2.create_sql();
        assert!(sql.starts_with("CREATE TABLE items ("));
        assert!(sql.contains("id TEXT PRIMARY KEY"));
        assert!(sql.contains("amount REAL NOT NULL"));
        assert!(sql.contains("created_at INTEGER NOT NULL DEFAULT 0"));
    }

    #[test]
    fn test_validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE items (id TEXT PRIMARY KEY, amount REAL NOT NULL)", [])
            .unwrap();

        let err = SCHEMAS[0].validate(&conn).unwrap_err().to_string();
        assert!(err.contains("missing index"));
        assert!(err.contains("idx_items_amount"));
    }

    #[test]
    fn test_validate_detects_type_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE items (id TEXT PRIMARY KEY, amount TEXT NOT NULL)", [])
            .unwrap();

        let err = SCHEMAS[0].validate(&conn).unwrap_err().to_string();
        assert!(err.contains("type mismatch"));
    }

    #[test]
    fn test_open_creates_then_reopens() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("test.db");

        let conn = open_versioned_db(&path, SCHEMAS, "test").unwrap();
        conn.execute("INSERT INTO items (id, amount) VALUES ('a', 1.5)", [])
            .unwrap();
        drop(conn);

        let conn = open_versioned_db(&path, SCHEMAS, "test").unwrap();
        let amount: f64 = conn
            .query_row("SELECT amount FROM items WHERE id = 'a'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(amount, 1.5);
    }

    #[test]
    fn test_open_migrates_forward() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("test.db");

        let conn = open_versioned_db(&path, SCHEMAS_V1_ONLY, "test").unwrap();
        conn.execute("INSERT INTO items (id, amount) VALUES ('a', 2.0)", [])
            .unwrap();
        drop(conn);

        let conn = open_versioned_db(&path, SCHEMAS, "test").unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version as usize, BASE_DB_VERSION + 2);
        SCHEMAS[1].validate(&conn).unwrap();

        let created_at: i64 = conn
            .query_row("SELECT created_at FROM items WHERE id = 'a'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(created_at, 0);
        drop(conn);

        // Already migrated: reopening validates without running the migration again
        open_versioned_db(&path, SCHEMAS, "test").unwrap();
    }

    #[test]
    fn test_open_rejects_foreign_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("foreign.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("CREATE TABLE other (x INTEGER)", []).unwrap();
        }
        let err = open_versioned_db(&path, SCHEMAS, "test")
            .unwrap_err()
            .to_string();
        assert!(err.contains("invalid"));
    }
}
