//! SQLite aggregate store
//!
//! Tables (see `/sql/` directory):
//! - `sites` - one row per site, carries the running total
//! - `readings` - append-only sensor readings, UNIQUE(idempotency_key)
//! - `batch_ledger` - one row per committed batch, PRIMARY KEY(batch_key)
//!
//! ## Unit of work
//!
//! Every ingestion request opens its own connection (`SqliteStore::connect`)
//! and runs on the blocking pool (`SqliteStore::run`). Nothing mutable is
//! shared between requests except the database file itself, so
//! serialization of writers is entirely SQLite's write lock.

pub mod primitives;
pub mod schema;
pub mod sites;

use crate::amount::Emission;
use crate::config::IngestConfig;
use crate::error::{IngestError, StoreError};
use crate::sqlite_pragma::apply_optimized_pragmas;
use crate::types::{BatchLedgerEntry, Reading, Site};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use std::path::Path;
use uuid::Uuid;

pub use schema::run_schema_migrations;

/// Cloneable handle to the store; holds configuration, not connections
#[derive(Debug, Clone)]
pub struct SqliteStore {
    config: IngestConfig,
}

impl SqliteStore {
    /// Create the database file (and parent directory) and run migrations
    pub fn open(config: IngestConfig) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(&config.db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { config };
        let mut conn = store.connect()?;
        run_schema_migrations(&mut conn, &store.config.schema_dir)?;

        log::info!("✅ Store ready: {}", store.config.db_path);
        Ok(store)
    }

    /// Open a fresh connection with the store PRAGMAs applied
    pub fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.config.db_path)?;
        apply_optimized_pragmas(&conn, self.config.lock_timeout(), self.config.enable_wal)?;
        Ok(conn)
    }

    /// Run one unit of work on its own connection on the blocking pool
    ///
    /// If the awaiting future is dropped the closure still runs to completion,
    /// so a transaction inside it either commits or rolls back as a whole.
    pub async fn run<F, T>(&self, work: F) -> Result<T, IngestError>
    where
        F: FnOnce(&mut Connection) -> Result<T, IngestError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = store.connect()?;
            work(&mut conn)
        })
        .await?
    }
}

pub(crate) const SITE_COLUMNS: &str =
    "id, name, location, emission_limit, total_emissions_to_date, created_at, updated_at";

pub(crate) const READING_COLUMNS: &str =
    "id, site_id, value, recorded_at, idempotency_key, created_at";

pub(crate) const LEDGER_COLUMNS: &str =
    "batch_key, site_id, readings_count, total_value, processed_at";

pub(crate) fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    Ok(Site {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        location: row.get(2)?,
        emission_limit: Emission::from_units(row.get(3)?),
        total_emissions_to_date: Emission::from_units(row.get(4)?),
        created_at: millis_column(row, 5)?,
        updated_at: millis_column(row, 6)?,
    })
}

pub(crate) fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        id: row.get(0)?,
        site_id: uuid_column(row, 1)?,
        value: Emission::from_units(row.get(2)?),
        recorded_at: millis_column(row, 3)?,
        idempotency_key: row.get(4)?,
        created_at: millis_column(row, 5)?,
    })
}

pub(crate) fn ledger_from_row(row: &Row<'_>) -> rusqlite::Result<BatchLedgerEntry> {
    let count: i64 = row.get(2)?;
    Ok(BatchLedgerEntry {
        batch_key: uuid_column(row, 0)?,
        site_id: uuid_column(row, 1)?,
        readings_count: usize::try_from(count)
            .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(2, count))?,
        total_value: Emission::from_units(row.get(3)?),
        processed_at: millis_column(row, 4)?,
    })
}

pub(crate) fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn millis_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// Fresh migrated store in a temp directory (keep the TempDir alive)
    pub fn temp_store() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = IngestConfig {
            db_path: dir.path().join("methane.db").to_string_lossy().into_owned(),
            schema_dir: concat!(env!("CARGO_MANIFEST_DIR"), "/sql").to_string(),
            ..IngestConfig::default()
        };
        let store = SqliteStore::open(config).unwrap();
        (dir, store)
    }
}
