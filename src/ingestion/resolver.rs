//! Conflict resolution for the write path
//!
//! Two requests carrying the same batch_key can both pass the ledger check
//! and race into the writer. The loser's transaction fails on the
//! idempotency UNIQUE constraint; that failure is a duplicate, not an error.

use super::{BatchPlan, WriteError};
use crate::error::IngestError;
use crate::types::IngestOutcome;

/// Turn a writer failure into an outcome or a caller-facing error
///
/// - idempotency UNIQUE violation → duplicate outcome built from this
///   request's own plan (the winning transaction committed the same batch)
/// - lock wait timeout → `IngestError::LockTimeout` (retryable)
/// - missing site → `IngestError::SiteNotFound`
/// - anything else → `IngestError::Store`
pub fn resolve(failure: WriteError, plan: &BatchPlan) -> Result<IngestOutcome, IngestError> {
    match failure {
        WriteError::SiteNotFound(site_id) => {
            log::debug!("Batch {} rejected: site {} not found", plan.batch_key, site_id);
            Err(IngestError::SiteNotFound(site_id))
        }
        WriteError::Store(err) if err.is_idempotency_violation() => {
            log::warn!(
                "⚠️  Concurrent duplicate for batch {} lost the commit race: {}",
                plan.batch_key,
                err
            );
            Ok(plan.outcome(true))
        }
        WriteError::Store(err) => {
            if err.is_busy() {
                log::warn!("⏳ Batch {} timed out waiting for the write lock", plan.batch_key);
            } else {
                log::error!("❌ Batch {} rolled back: {}", plan.batch_key, err);
            }
            Err(err.into())
        }
    }
}
