//! Store primitives used by the ingestion write path
//!
//! Each function is a single statement (or one prepared statement in a loop)
//! and never commits. Transaction boundaries belong to the caller.
//!
//! ## Locking
//!
//! SQLite has no `SELECT ... FOR UPDATE`. `begin_site_lock` opens the
//! transaction with `BEGIN IMMEDIATE`, which takes the database write lock
//! up front (waiting at most the busy timeout). That lock covers the site
//! row, so the read-modify-write on the running total cannot interleave with
//! another writer. It is coarser than a row lock: writers for different
//! sites also queue behind each other.

use super::{ledger_from_row, site_from_row, LEDGER_COLUMNS, SITE_COLUMNS};
use crate::amount::MAX_UNITS;
use crate::error::StoreError;
use crate::ingestion::PlannedReading;
use crate::types::{BatchLedgerEntry, Site};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use uuid::Uuid;

/// Start a write transaction holding the exclusive write lock
///
/// Dropping the returned transaction without commit rolls it back.
pub fn begin_site_lock(conn: &mut Connection) -> Result<Transaction<'_>, StoreError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Lock-and-return: read the site inside the locked transaction, or None
pub fn lock_site(tx: &Transaction<'_>, site_id: &Uuid) -> Result<Option<Site>, StoreError> {
    let sql = format!("SELECT {} FROM sites WHERE id = ?1", SITE_COLUMNS);
    let site = tx
        .query_row(&sql, params![site_id.to_string()], site_from_row)
        .optional()?;
    Ok(site)
}

/// Insert all readings of a batch
///
/// Any UNIQUE violation on `idempotency_key` aborts the statement with an
/// error; the caller's transaction then rolls back every row of the batch.
pub fn insert_readings(
    tx: &Transaction<'_>,
    site_id: &Uuid,
    readings: &[PlannedReading],
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO readings (site_id, value, recorded_at, idempotency_key, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    let site_id = site_id.to_string();
    let created_at = now.timestamp_millis();

    for reading in readings {
        stmt.execute(params![
            site_id,
            reading.value_units,
            reading.recorded_at.timestamp_millis(),
            reading.idempotency_key,
            created_at,
        ])?;
    }

    Ok(readings.len())
}

/// Add `delta_units` to the site's running total in place
///
/// The addition happens inside SQLite (`total = total + ?`), never as a
/// read-then-write in Rust. The WHERE guard keeps the total inside the
/// storable range; SQLite would otherwise promote an overflowing integer to
/// REAL.
pub fn increment_site_total(
    tx: &Transaction<'_>,
    site_id: &Uuid,
    delta_units: i64,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let updated = tx.execute(
        "UPDATE sites
         SET total_emissions_to_date = total_emissions_to_date + ?1,
             updated_at = ?2
         WHERE id = ?3 AND total_emissions_to_date <= ?4 - ?1",
        params![delta_units, now.timestamp_millis(), site_id.to_string(), MAX_UNITS],
    )?;

    if updated == 0 {
        return Err(StoreError::TotalOverflow(*site_id));
    }

    Ok(())
}

/// Single indexed lookup on the ledger's primary key
pub fn find_ledger_entry(
    conn: &Connection,
    batch_key: &Uuid,
) -> Result<Option<BatchLedgerEntry>, StoreError> {
    let sql = format!("SELECT {} FROM batch_ledger WHERE batch_key = ?1", LEDGER_COLUMNS);
    let entry = conn
        .query_row(&sql, params![batch_key.to_string()], ledger_from_row)
        .optional()?;
    Ok(entry)
}

pub fn insert_ledger_entry(
    tx: &Transaction<'_>,
    entry: &BatchLedgerEntry,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO batch_ledger (batch_key, site_id, readings_count, total_value, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.batch_key.to_string(),
            entry.site_id.to_string(),
            entry.readings_count as i64,
            entry.total_value.to_units()?,
            entry.processed_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Emission;
    use crate::store::sites::insert_site;
    use crate::store::test_support::temp_store;
    use crate::types::{idempotency_key, NewSite};

    fn new_site(conn: &Connection) -> Site {
        insert_site(
            conn,
            &NewSite {
                name: "Well Pad Alpha".to_string(),
                location: "Alberta, Canada".to_string(),
                emission_limit: "5000".parse().unwrap(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn planned(batch_key: &Uuid, index: usize, units: i64) -> PlannedReading {
        PlannedReading {
            value: Emission::from_units(units),
            value_units: units,
            recorded_at: Utc::now(),
            idempotency_key: idempotency_key(batch_key, index),
        }
    }

    #[test]
    fn test_lock_site_missing() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();

        let tx = begin_site_lock(&mut conn).unwrap();
        assert!(lock_site(&tx, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_increment_is_additive() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let site = new_site(&conn);

        let tx = begin_site_lock(&mut conn).unwrap();
        increment_site_total(&tx, &site.id, 1_000_000, Utc::now()).unwrap();
        increment_site_total(&tx, &site.id, 2_000_000, Utc::now()).unwrap();
        let locked = lock_site(&tx, &site.id).unwrap().unwrap();
        tx.commit().unwrap();

        assert_eq!(locked.total_emissions_to_date, "300".parse().unwrap());
    }

    #[test]
    fn test_increment_overflow_guard() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let site = new_site(&conn);

        let tx = begin_site_lock(&mut conn).unwrap();
        increment_site_total(&tx, &site.id, MAX_UNITS, Utc::now()).unwrap();
        let result = increment_site_total(&tx, &site.id, 1, Utc::now());
        assert!(matches!(result, Err(StoreError::TotalOverflow(_))));
    }

    #[test]
    fn test_reading_key_collision_rejected() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let site = new_site(&conn);
        let batch_key = Uuid::new_v4();

        let tx = begin_site_lock(&mut conn).unwrap();
        insert_readings(&tx, &site.id, &[planned(&batch_key, 0, 10)], Utc::now()).unwrap();
        let err = insert_readings(&tx, &site.id, &[planned(&batch_key, 0, 10)], Utc::now())
            .unwrap_err();

        assert!(err.is_idempotency_violation());
    }

    #[test]
    fn test_ledger_round_trip() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let site = new_site(&conn);
        let entry = BatchLedgerEntry {
            batch_key: Uuid::new_v4(),
            site_id: site.id,
            readings_count: 2,
            total_value: "300".parse().unwrap(),
            processed_at: DateTime::from_timestamp_millis(1_770_724_800_000).unwrap(),
        };

        let tx = begin_site_lock(&mut conn).unwrap();
        insert_ledger_entry(&tx, &entry).unwrap();
        tx.commit().unwrap();

        assert_eq!(find_ledger_entry(&conn, &entry.batch_key).unwrap(), Some(entry.clone()));

        let tx = begin_site_lock(&mut conn).unwrap();
        let err = insert_ledger_entry(&tx, &entry).unwrap_err();
        assert!(err.is_idempotency_violation());
    }
}
