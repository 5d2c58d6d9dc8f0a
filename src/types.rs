//! Core data structures for sites, readings and the batch ledger
//!
//! Request/response shapes are serde-friendly so the CLI (or any API layer in
//! front of the crate) can pass them through as JSON unchanged.

use crate::amount::Emission;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on readings accepted in a single batch
pub const MAX_READINGS_PER_BATCH: usize = 100;

/// Monitored site with its precomputed running total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub emission_limit: Emission,
    pub total_emissions_to_date: Emission,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Site {
    pub fn compliance_status(&self) -> ComplianceStatus {
        ComplianceStatus::evaluate(&self.total_emissions_to_date, &self.emission_limit)
    }
}

/// Registration input for a new site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSite {
    pub name: String,
    pub location: String,
    pub emission_limit: Emission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceStatus {
    #[serde(rename = "Within Limit")]
    WithinLimit,
    #[serde(rename = "Limit Exceeded")]
    LimitExceeded,
}

impl ComplianceStatus {
    /// Reaching the limit exactly is still compliant
    pub fn evaluate(total: &Emission, limit: &Emission) -> Self {
        if total <= limit {
            ComplianceStatus::WithinLimit
        } else {
            ComplianceStatus::LimitExceeded
        }
    }
}

/// Persisted sensor reading (immutable once written)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    pub site_id: Uuid,
    pub value: Emission,
    pub recorded_at: DateTime<Utc>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// One reading as submitted by a sensor gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingInput {
    pub value: Emission,
    pub recorded_at: DateTime<Utc>,
}

/// Ingestion request for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub site_id: Uuid,
    pub batch_key: Uuid,
    pub readings: Vec<ReadingInput>,
}

/// Result of an ingestion call
///
/// `duplicate == true` means nothing was written by this call; the numbers
/// describe the batch that was already recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub batch_key: Uuid,
    pub readings_processed: usize,
    pub total_value: Emission,
    pub duplicate: bool,
}

/// Record of a committed batch, also the idempotency record replayed on retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchLedgerEntry {
    pub batch_key: Uuid,
    pub site_id: Uuid,
    pub readings_count: usize,
    pub total_value: Emission,
    pub processed_at: DateTime<Utc>,
}

impl BatchLedgerEntry {
    pub fn to_duplicate_outcome(&self) -> IngestOutcome {
        IngestOutcome {
            batch_key: self.batch_key,
            readings_processed: self.readings_count,
            total_value: self.total_value.clone(),
            duplicate: true,
        }
    }
}

/// Read-side summary for dashboards and compliance checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteMetrics {
    pub site_id: Uuid,
    pub name: String,
    pub location: String,
    pub emission_limit: Emission,
    pub total_emissions_to_date: Emission,
    pub status: ComplianceStatus,
    pub readings_count: i64,
    pub last_reading_at: Option<DateTime<Utc>>,
}

/// Running total compared against a full scan of the site's readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalAudit {
    pub site_id: Uuid,
    pub running_total: Emission,
    pub scanned_total: Emission,
    pub readings_count: i64,
    pub consistent: bool,
}

/// Per-reading idempotency key: `{batch_key}:{index}`
pub fn idempotency_key(batch_key: &Uuid, index: usize) -> String {
    format!("{}:{}", batch_key, index)
}
