//! Connection-level SQLite settings shared by every store connection

use rusqlite::Connection;
use std::time::Duration;

/// Apply PRAGMAs for the ingestion workload
///
/// - WAL so duplicate lookups never wait behind an open write transaction
/// - synchronous=NORMAL (durable at checkpoint, safe with WAL)
/// - foreign_keys=ON (readings and ledger rows must reference a site)
/// - temp_store=MEMORY, 64MB page cache
/// - wal_autocheckpoint=1000 pages
/// - busy timeout = bounded wait for the write lock (set first so the
///   journal_mode switch below also waits instead of failing)
pub fn apply_optimized_pragmas(
    conn: &Connection,
    lock_timeout: Duration,
    enable_wal: bool,
) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(lock_timeout)?;

    if enable_wal {
        // journal_mode returns the resulting mode as a row
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            log::warn!("⚠️  SQLite refused WAL mode (journal_mode={})", mode);
        }
    }

    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "cache_size", -64_000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000)?;

    Ok(())
}
