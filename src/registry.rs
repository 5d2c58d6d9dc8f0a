//! Site registry: registration, read-side queries and total audits
//!
//! Thin async wrapper over `store::sites`. Every call gets its own
//! connection on the blocking pool, same as ingestion.

use crate::error::IngestError;
use crate::store::sites;
use crate::store::SqliteStore;
use crate::types::{NewSite, Reading, Site, SiteMetrics, TotalAudit};
use crate::validation::validate_new_site;
use chrono::Utc;
use uuid::Uuid;

/// Readings returned by `recent_readings` when the caller gives no limit
pub const DEFAULT_RECENT_READINGS: usize = 10;

#[derive(Debug, Clone)]
pub struct SiteRegistry {
    store: SqliteStore,
}

impl SiteRegistry {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    pub async fn create_site(&self, site: NewSite) -> Result<Site, IngestError> {
        validate_new_site(&site)?;

        let created = self
            .store
            .run(move |conn| Ok(sites::insert_site(conn, &site, Utc::now())?))
            .await?;

        log::info!(
            "🏭 Registered site {} ({}, {}) limit {} kg",
            created.id,
            created.name,
            created.location,
            created.emission_limit
        );
        Ok(created)
    }

    pub async fn get_site(&self, site_id: Uuid) -> Result<Site, IngestError> {
        self.store
            .run(move |conn| sites::get_site(conn, &site_id)?.ok_or(IngestError::SiteNotFound(site_id)))
            .await
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>, IngestError> {
        self.store.run(|conn| Ok(sites::list_sites(conn)?)).await
    }

    pub async fn site_metrics(&self, site_id: Uuid) -> Result<SiteMetrics, IngestError> {
        self.store
            .run(move |conn| {
                sites::site_metrics(conn, &site_id)?.ok_or(IngestError::SiteNotFound(site_id))
            })
            .await
    }

    pub async fn recent_readings(
        &self,
        site_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<Reading>, IngestError> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_READINGS);
        self.store
            .run(move |conn| {
                if sites::get_site(conn, &site_id)?.is_none() {
                    return Err(IngestError::SiteNotFound(site_id));
                }
                Ok(sites::recent_readings(conn, &site_id, limit)?)
            })
            .await
    }

    /// Recompute the site total from its readings and compare
    pub async fn audit_site_total(&self, site_id: Uuid) -> Result<TotalAudit, IngestError> {
        self.store
            .run(move |conn| {
                sites::audit_site_total(conn, &site_id)?.ok_or(IngestError::SiteNotFound(site_id))
            })
            .await
    }

    /// Register the three demo sites if the registry is empty
    ///
    /// Returns the sites that were created; an already-populated store is left
    /// alone and yields an empty list.
    pub async fn seed_demo_sites(&self) -> Result<Vec<Site>, IngestError> {
        if !self.list_sites().await?.is_empty() {
            log::info!("🌱 Sites already present, skipping seed");
            return Ok(Vec::new());
        }

        let mut created = Vec::new();
        for (name, location, limit) in DEMO_SITES {
            let site = NewSite {
                name: name.to_string(),
                location: location.to_string(),
                emission_limit: limit
                    .parse()
                    .map_err(|e| IngestError::Internal(format!("demo limit {}: {}", limit, e)))?,
            };
            created.push(self.create_site(site).await?);
        }

        log::info!("🌱 Seeded {} demo sites", created.len());
        Ok(created)
    }
}

const DEMO_SITES: [(&str, &str, &str); 3] = [
    ("Well Pad Alpha", "Alberta, Canada", "5000"),
    ("Processing Plant Beta", "Texas, USA", "12000"),
    ("Compressor Station Gamma", "North Sea, UK", "3000"),
];
