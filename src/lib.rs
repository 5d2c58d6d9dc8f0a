//! Methane emission batch ingestion
//!
//! Sensor gateways push batches of readings per site and retry on timeout.
//! This crate makes that write path idempotent: a batch is recorded at most
//! once, every site carries an exact running total, and a failed batch
//! leaves no trace.
//!
//! - `ingestion` - the write path (`IngestionService`)
//! - `registry` - site registration and read-side queries
//! - `store` - SQLite schema, connections and statement primitives
//! - `amount` - exact decimal quantities (`Emission`)

pub mod amount;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod registry;
pub mod sqlite_pragma;
pub mod store;
pub mod types;
pub mod validation;

pub use amount::Emission;
pub use config::IngestConfig;
pub use error::{IngestError, StoreError};
pub use ingestion::{BatchIngestor, IngestionService};
pub use registry::SiteRegistry;
pub use store::SqliteStore;
pub use types::{
    ComplianceStatus, IngestOutcome, IngestRequest, NewSite, Reading, ReadingInput, Site,
    SiteMetrics, TotalAudit,
};
