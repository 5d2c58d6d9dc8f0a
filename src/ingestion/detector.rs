//! Fast-path duplicate detection
//!
//! Looks the batch_key up in `batch_ledger` before any transaction is
//! opened. A hit replays the stored outcome; a miss only means "go ahead",
//! the constraints in the write path remain the authority.

use crate::error::StoreError;
use crate::store::primitives::find_ledger_entry;
use crate::types::IngestOutcome;
use rusqlite::Connection;
use uuid::Uuid;

/// Advisory ledger lookup; read-only, takes no lock
#[derive(Debug, Default, Clone, Copy)]
pub struct DuplicateDetector;

impl DuplicateDetector {
    pub fn new() -> Self {
        Self
    }

    /// Returns the recorded outcome (tagged `duplicate = true`) if the batch
    /// was already committed
    ///
    /// A plain autocommit read: under WAL it sees the last committed state
    /// and never waits for an in-flight write transaction.
    pub fn check(
        &self,
        conn: &Connection,
        batch_key: &Uuid,
        site_id: &Uuid,
    ) -> Result<Option<IngestOutcome>, StoreError> {
        let Some(entry) = find_ledger_entry(conn, batch_key)? else {
            return Ok(None);
        };

        if entry.site_id != *site_id {
            log::warn!(
                "⚠️  Batch {} replayed against site {} but was recorded for site {}",
                batch_key,
                site_id,
                entry.site_id
            );
        }

        log::debug!(
            "🔁 Duplicate batch {} (recorded {} readings, total {})",
            batch_key,
            entry.readings_count,
            entry.total_value
        );

        Ok(Some(entry.to_duplicate_outcome()))
    }
}
