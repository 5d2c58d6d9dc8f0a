//! # Idempotent batch ingestion
//!
//! Write path for sensor batches. Clients retry on timeout, so the same
//! batch can arrive any number of times, possibly concurrently. A batch is
//! counted at most once and the site's running total is only ever
//! incremented, never recomputed.
//!
//! ## Flow
//!
//! ```text
//! IngestRequest
//!     ↓ validate + BatchPlan::from_request (batch total computed once)
//! DuplicateDetector::check ── hit ──→ stored outcome, duplicate = true
//!     ↓ miss
//! TransactionalWriter::write
//!     BEGIN IMMEDIATE (site write lock)
//!     → site exists? → INSERT readings → total += batch_total
//!     → INSERT batch_ledger → COMMIT
//!     ↓ failure
//! resolver::resolve ── idempotency UNIQUE violation ──→ duplicate = true
//!     ↓ anything else
//! IngestError
//! ```
//!
//! ## Two layers of duplicate protection
//!
//! The ledger lookup is advisory: two requests with the same batch_key can
//! both miss it. The UNIQUE constraints on `readings.idempotency_key` and
//! `batch_ledger.batch_key` are authoritative: only one transaction commits,
//! the other fails and is turned into a duplicate response by the resolver.
//!
//! ## Module Organization
//!
//! - `detector` - fast-path ledger lookup
//! - `writer` - the single-transaction write
//! - `resolver` - maps writer failures to outcomes or errors
//! - `service` - async entry point (`IngestionService`, `BatchIngestor`)

pub mod detector;
pub mod resolver;
pub mod service;
pub mod writer;

pub use detector::DuplicateDetector;
pub use service::{BatchIngestor, IngestionService};
pub use writer::{TransactionalWriter, WriteError};

use crate::amount::Emission;
use crate::error::IngestError;
use crate::types::{idempotency_key, IngestOutcome, IngestRequest};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One reading ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedReading {
    pub value: Emission,
    pub value_units: i64,
    pub recorded_at: DateTime<Utc>,
    pub idempotency_key: String,
}

/// Everything the write path needs, derived from the request up front
///
/// Depends only on the input, so it is computed before any transaction and
/// reused by the resolver when a concurrent duplicate is detected.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    pub site_id: Uuid,
    pub batch_key: Uuid,
    pub readings: Vec<PlannedReading>,
    pub batch_total: Emission,
    pub batch_total_units: i64,
}

impl BatchPlan {
    /// Build the plan; the request must already have passed validation
    pub fn from_request(request: &IngestRequest) -> Result<Self, IngestError> {
        let mut readings = Vec::with_capacity(request.readings.len());

        for (index, input) in request.readings.iter().enumerate() {
            let value_units = input
                .value
                .to_units()
                .map_err(|e| IngestError::Validation(format!("readings[{}]: {}", index, e)))?;

            readings.push(PlannedReading {
                value: input.value.clone(),
                value_units,
                recorded_at: input.recorded_at,
                idempotency_key: idempotency_key(&request.batch_key, index),
            });
        }

        let batch_total: Emission = readings.iter().map(|r| &r.value).sum();
        let batch_total_units = batch_total
            .to_units()
            .map_err(|e| IngestError::Validation(format!("batch total: {}", e)))?;

        Ok(Self {
            site_id: request.site_id,
            batch_key: request.batch_key,
            readings,
            batch_total,
            batch_total_units,
        })
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Outcome describing this plan
    pub fn outcome(&self, duplicate: bool) -> IngestOutcome {
        IngestOutcome {
            batch_key: self.batch_key,
            readings_processed: self.readings.len(),
            total_value: self.batch_total.clone(),
            duplicate,
        }
    }
}
