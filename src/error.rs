//! Error types for the store and the ingestion path
//!
//! `StoreError` is what SQLite access produces. `IngestError` is what callers
//! of the crate see, already sorted into client / retryable / internal.

use crate::amount::AmountError;
use rusqlite::ErrorCode;
use uuid::Uuid;

/// Columns whose uniqueness encodes batch idempotency
const IDEMPOTENCY_COLUMNS: [&str; 2] = ["readings.idempotency_key", "batch_ledger.batch_key"];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Amount error: {0}")]
    Amount(#[from] AmountError),

    #[error("Running total for site {0} would exceed the storable range")]
    TotalOverflow(Uuid),
}

impl StoreError {
    /// True when the failure is a UNIQUE / PRIMARY KEY violation on one of
    /// the idempotency columns. Other constraint failures (CHECK, FOREIGN KEY,
    /// trigger aborts) are not.
    pub fn is_idempotency_violation(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, message))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                let unique = err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY;

                unique
                    && message
                        .as_deref()
                        .map(|m| IDEMPOTENCY_COLUMNS.iter().any(|col| m.contains(col)))
                        .unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Lock wait exceeded the busy timeout
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::DatabaseBusy || err.code == ErrorCode::DatabaseLocked
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Malformed request; never reaches the store
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Site {0} not found")]
    SiteNotFound(Uuid),

    /// Lock wait timed out or the store was busy; safe to retry with the
    /// same batch_key
    #[error("Store busy, retry later: {0}")]
    LockTimeout(String),

    #[error("Store failure: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::LockTimeout(_))
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, IngestError::Validation(_) | IngestError::SiteNotFound(_))
    }

    /// Short machine-readable code for API layers and CLI output
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "VALIDATION_FAILED",
            IngestError::SiteNotFound(_) => "SITE_NOT_FOUND",
            IngestError::LockTimeout(_) => "STORE_BUSY",
            IngestError::Store(_) | IngestError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        if err.is_busy() {
            IngestError::LockTimeout(err.to_string())
        } else {
            IngestError::Store(err)
        }
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::from(err).into()
    }
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Internal(format!("store task failed: {}", err))
    }
}
