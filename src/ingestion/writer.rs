//! Transactional ingestion writer
//!
//! One batch, one transaction:
//!
//! 1. `BEGIN IMMEDIATE` - take the write lock covering the site row
//! 2. site missing under the lock → `WriteError::SiteNotFound`
//! 3. INSERT one reading per input, key `{batch_key}:{index}`
//! 4. `total_emissions_to_date += batch_total` in place
//! 5. INSERT the batch_ledger row
//! 6. COMMIT
//!
//! Any error before step 6 drops the transaction, which rolls back every
//! statement above. Nothing partial is ever visible.

use super::BatchPlan;
use crate::error::StoreError;
use crate::store::primitives::{
    begin_site_lock, increment_site_total, insert_ledger_entry, insert_readings, lock_site,
};
use crate::types::{BatchLedgerEntry, ComplianceStatus, IngestOutcome};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Site {0} not found")]
    SiteNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for WriteError {
    fn from(err: rusqlite::Error) -> Self {
        WriteError::Store(StoreError::from(err))
    }
}

/// Writes a planned batch atomically
#[derive(Clone)]
pub struct TransactionalWriter {
    /// Timestamp source (swappable for deterministic tests)
    now_fn: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl Default for TransactionalWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalWriter").finish_non_exhaustive()
    }
}

impl TransactionalWriter {
    pub fn new() -> Self {
        Self::new_with_timestamp_fn(Arc::new(Utc::now))
    }

    pub fn new_with_timestamp_fn(now_fn: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        Self { now_fn }
    }

    pub fn write(&self, conn: &mut Connection, plan: &BatchPlan) -> Result<IngestOutcome, WriteError> {
        let tx = begin_site_lock(conn)?;

        let Some(site) = lock_site(&tx, &plan.site_id)? else {
            return Err(WriteError::SiteNotFound(plan.site_id));
        };

        let now = (self.now_fn)();

        insert_readings(&tx, &plan.site_id, &plan.readings, now)?;
        increment_site_total(&tx, &plan.site_id, plan.batch_total_units, now)?;
        insert_ledger_entry(
            &tx,
            &BatchLedgerEntry {
                batch_key: plan.batch_key,
                site_id: plan.site_id,
                readings_count: plan.len(),
                total_value: plan.batch_total.clone(),
                processed_at: now,
            },
        )?;

        tx.commit()?;

        // Lock is released; this is the value the increment produced
        let new_total = site.total_emissions_to_date.clone() + &plan.batch_total;

        log::info!(
            "✅ Batch {} committed: {} readings, +{} kg → site {} total {} kg",
            plan.batch_key,
            plan.len(),
            plan.batch_total,
            plan.site_id,
            new_total
        );

        if site.compliance_status() == ComplianceStatus::WithinLimit
            && ComplianceStatus::evaluate(&new_total, &site.emission_limit)
                == ComplianceStatus::LimitExceeded
        {
            log::warn!(
                "🚨 Site {} ({}) exceeded its emission limit: {} > {} kg",
                site.id,
                site.name,
                new_total,
                site.emission_limit
            );
        }

        Ok(plan.outcome(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Emission;
    use crate::store::primitives::find_ledger_entry;
    use crate::store::sites::{get_site, insert_site};
    use crate::store::test_support::temp_store;
    use crate::types::{IngestRequest, NewSite, ReadingInput};

    fn fixed_writer() -> TransactionalWriter {
        let fixed = DateTime::from_timestamp(1_770_724_800, 0).unwrap();
        TransactionalWriter::new_with_timestamp_fn(Arc::new(move || fixed))
    }

    fn plan_for(site_id: Uuid, values: &[&str]) -> BatchPlan {
        let request = IngestRequest {
            site_id,
            batch_key: Uuid::new_v4(),
            readings: values
                .iter()
                .map(|v| ReadingInput {
                    value: v.parse().unwrap(),
                    recorded_at: Utc::now(),
                })
                .collect(),
        };
        BatchPlan::from_request(&request).unwrap()
    }

    fn site_with_limit(conn: &Connection, limit: &str) -> Uuid {
        insert_site(
            conn,
            &NewSite {
                name: "Compressor Station Gamma".to_string(),
                location: "North Sea, UK".to_string(),
                emission_limit: limit.parse().unwrap(),
            },
            Utc::now(),
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_write_commits_everything() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let site_id = site_with_limit(&conn, "5000");
        let plan = plan_for(site_id, &["100", "200"]);

        let outcome = fixed_writer().write(&mut conn, &plan).unwrap();

        assert_eq!(outcome.readings_processed, 2);
        assert_eq!(outcome.total_value, "300".parse::<Emission>().unwrap());
        assert!(!outcome.duplicate);

        let site = get_site(&conn, &site_id).unwrap().unwrap();
        assert_eq!(site.total_emissions_to_date, "300".parse().unwrap());

        let entry = find_ledger_entry(&conn, &plan.batch_key).unwrap().unwrap();
        assert_eq!(entry.readings_count, 2);
        assert_eq!(entry.processed_at, DateTime::from_timestamp(1_770_724_800, 0).unwrap());
    }

    #[test]
    fn test_missing_site_writes_nothing() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let plan = plan_for(Uuid::new_v4(), &["100"]);

        let err = fixed_writer().write(&mut conn, &plan).unwrap_err();
        assert!(matches!(err, WriteError::SiteNotFound(id) if id == plan.site_id));

        let readings: i64 = conn
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(readings, 0);
    }

    #[test]
    fn test_replayed_plan_hits_unique_constraint() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let site_id = site_with_limit(&conn, "5000");
        let plan = plan_for(site_id, &["1.5"]);

        let writer = fixed_writer();
        writer.write(&mut conn, &plan).unwrap();

        match writer.write(&mut conn, &plan) {
            Err(WriteError::Store(e)) => assert!(e.is_idempotency_violation()),
            other => panic!("expected unique violation, got {:?}", other),
        }

        let site = get_site(&conn, &site_id).unwrap().unwrap();
        assert_eq!(site.total_emissions_to_date, "1.5".parse().unwrap());
    }

    #[test]
    fn test_zero_value_batch_is_valid() {
        let (_dir, store) = temp_store();
        let mut conn = store.connect().unwrap();
        let site_id = site_with_limit(&conn, "10");

        let outcome = fixed_writer()
            .write(&mut conn, &plan_for(site_id, &["0", "0"]))
            .unwrap();

        assert!(outcome.total_value.is_zero());
        assert_eq!(outcome.readings_processed, 2);
    }
}
