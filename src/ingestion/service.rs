//! Async ingestion entry point

use super::{resolver, BatchPlan, DuplicateDetector, TransactionalWriter};
use crate::error::IngestError;
use crate::store::SqliteStore;
use crate::types::{IngestOutcome, IngestRequest};
use crate::validation::validate_ingest_request;
use async_trait::async_trait;

/// Backend trait for batch ingestion
///
/// Lets an API layer hold `Arc<dyn BatchIngestor>` without knowing the
/// store behind it.
#[async_trait]
pub trait BatchIngestor: Send + Sync {
    /// Ingest one batch; safe to call again with the same batch_key
    async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// SQLite-backed ingestion: detector → writer → resolver
#[derive(Debug, Clone)]
pub struct IngestionService {
    store: SqliteStore,
    detector: DuplicateDetector,
    writer: TransactionalWriter,
}

impl IngestionService {
    pub fn new(store: SqliteStore) -> Self {
        Self::with_writer(store, TransactionalWriter::new())
    }

    pub fn with_writer(store: SqliteStore, writer: TransactionalWriter) -> Self {
        Self {
            store,
            detector: DuplicateDetector::new(),
            writer,
        }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Validate, plan, then run the detector/writer/resolver sequence on a
    /// dedicated connection
    ///
    /// A duplicate found only through the UNIQUE constraint is answered with
    /// the ledger entry the winning transaction wrote, falling back to this
    /// request's own plan if that entry cannot be read.
    ///
    /// No automatic retry: a `LockTimeout` goes back to the caller, who
    /// retries with the same batch_key.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError> {
        validate_ingest_request(&request)?;
        let plan = BatchPlan::from_request(&request)?;

        log::debug!(
            "📥 Batch {} for site {}: {} readings, {} kg",
            plan.batch_key,
            plan.site_id,
            plan.len(),
            plan.batch_total
        );

        let detector = self.detector;
        let writer = self.writer.clone();

        self.store
            .run(move |conn| {
                if let Some(recorded) = detector.check(conn, &plan.batch_key, &plan.site_id)? {
                    log::info!("🔁 Batch {} already ingested, replaying result", plan.batch_key);
                    return Ok(recorded);
                }

                let failure = match writer.write(conn, &plan) {
                    Ok(outcome) => return Ok(outcome),
                    Err(failure) => failure,
                };

                let derived = resolver::resolve(failure, &plan)?;

                // The winner has committed by now; report what it recorded
                match detector.check(conn, &plan.batch_key, &plan.site_id) {
                    Ok(Some(recorded)) => {
                        if recorded.readings_processed != derived.readings_processed
                            || recorded.total_value != derived.total_value
                        {
                            log::warn!(
                                "⚠️  Batch {} resubmitted with a different payload: recorded {} readings / {} kg, this request {} readings / {} kg",
                                plan.batch_key,
                                recorded.readings_processed,
                                recorded.total_value,
                                derived.readings_processed,
                                derived.total_value
                            );
                        }
                        Ok(recorded)
                    }
                    Ok(None) => Ok(derived),
                    Err(e) => {
                        log::debug!("Ledger re-read for batch {} failed: {}", plan.batch_key, e);
                        Ok(derived)
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl BatchIngestor for IngestionService {
    async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError> {
        IngestionService::ingest(self, request).await
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sites::{get_site, insert_site};
    use crate::store::test_support::temp_store;
    use crate::types::{NewSite, ReadingInput};
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn setup() -> (tempfile::TempDir, IngestionService, Uuid) {
        let (dir, store) = temp_store();
        let conn = store.connect().unwrap();
        let site = insert_site(
            &conn,
            &NewSite {
                name: "Well Pad Alpha".to_string(),
                location: "Alberta, Canada".to_string(),
                emission_limit: "5000".parse().unwrap(),
            },
            Utc::now(),
        )
        .unwrap();
        (dir, IngestionService::new(store), site.id)
    }

    fn request(site_id: Uuid, values: &[&str]) -> IngestRequest {
        IngestRequest {
            site_id,
            batch_key: Uuid::new_v4(),
            readings: values
                .iter()
                .map(|v| ReadingInput { value: v.parse().unwrap(), recorded_at: Utc::now() })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_new_then_duplicate() {
        let (_dir, service, site_id) = setup();
        let req = request(site_id, &["100", "200"]);

        let first = service.ingest(req.clone()).await.unwrap();
        assert!(!first.duplicate);

        let second = service.ingest(req).await.unwrap();
        assert!(second.duplicate);
        assert_eq!(second.total_value, first.total_value);
        assert_eq!(second.readings_processed, 2);

        let conn = service.store().connect().unwrap();
        let site = get_site(&conn, &site_id).unwrap().unwrap();
        assert_eq!(site.total_emissions_to_date, "300".parse().unwrap());
    }

    #[tokio::test]
    async fn test_validation_runs_first() {
        let (_dir, service, site_id) = setup();

        let err = service.ingest(request(site_id, &[])).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let err = service.ingest(request(site_id, &["-5"])).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn test_trait_object_dispatch() {
        let (_dir, service, site_id) = setup();
        let ingestor: Arc<dyn BatchIngestor> = Arc::new(service);

        assert_eq!(ingestor.backend_type(), "SQLite");
        let outcome = ingestor.ingest(request(site_id, &["42.5"])).await.unwrap();
        assert_eq!(outcome.total_value, "42.5".parse().unwrap());
    }
}
