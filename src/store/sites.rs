//! Site registration and read-side queries
//!
//! None of these touch the running total except `insert_site`, which starts
//! it at zero.

use super::{millis_column, reading_from_row, site_from_row, READING_COLUMNS, SITE_COLUMNS};
use crate::amount::Emission;
use crate::error::StoreError;
use crate::types::{NewSite, Reading, Site, SiteMetrics, TotalAudit};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

pub fn insert_site(conn: &Connection, site: &NewSite, now: DateTime<Utc>) -> Result<Site, StoreError> {
    let id = Uuid::new_v4();
    let limit_units = site.emission_limit.to_units()?;
    let now_ms = now.timestamp_millis();

    conn.execute(
        "INSERT INTO sites (id, name, location, emission_limit, total_emissions_to_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
        params![id.to_string(), site.name, site.location, limit_units, now_ms],
    )?;

    let created_at = DateTime::from_timestamp_millis(now_ms).unwrap_or(now);

    Ok(Site {
        id,
        name: site.name.clone(),
        location: site.location.clone(),
        emission_limit: Emission::from_units(limit_units),
        total_emissions_to_date: Emission::zero(),
        created_at,
        updated_at: created_at,
    })
}

pub fn get_site(conn: &Connection, site_id: &Uuid) -> Result<Option<Site>, StoreError> {
    let sql = format!("SELECT {} FROM sites WHERE id = ?1", SITE_COLUMNS);
    Ok(conn
        .query_row(&sql, params![site_id.to_string()], site_from_row)
        .optional()?)
}

/// All sites, oldest first
pub fn list_sites(conn: &Connection) -> Result<Vec<Site>, StoreError> {
    let sql = format!("SELECT {} FROM sites ORDER BY created_at, name", SITE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let sites = stmt
        .query_map([], site_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sites)
}

/// Site summary with reading count and latest sensor timestamp
pub fn site_metrics(conn: &Connection, site_id: &Uuid) -> Result<Option<SiteMetrics>, StoreError> {
    let Some(site) = get_site(conn, site_id)? else {
        return Ok(None);
    };

    let (readings_count, last_reading_at) = conn.query_row(
        "SELECT COUNT(*), MAX(recorded_at) FROM readings WHERE site_id = ?1",
        params![site_id.to_string()],
        |row| {
            let count: i64 = row.get(0)?;
            let last: Option<i64> = row.get(1)?;
            let last = match last {
                Some(_) => Some(millis_column(row, 1)?),
                None => None,
            };
            Ok((count, last))
        },
    )?;

    Ok(Some(SiteMetrics {
        site_id: site.id,
        status: site.compliance_status(),
        name: site.name,
        location: site.location,
        emission_limit: site.emission_limit,
        total_emissions_to_date: site.total_emissions_to_date,
        readings_count,
        last_reading_at,
    }))
}

/// Most recent readings by sensor timestamp (not ingestion order)
pub fn recent_readings(
    conn: &Connection,
    site_id: &Uuid,
    limit: usize,
) -> Result<Vec<Reading>, StoreError> {
    let sql = format!(
        "SELECT {} FROM readings WHERE site_id = ?1 ORDER BY recorded_at DESC, id DESC LIMIT ?2",
        READING_COLUMNS
    );
    // usize beyond i64 would wrap negative, which SQLite reads as "no limit"
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(&sql)?;
    let readings = stmt
        .query_map(params![site_id.to_string(), limit], reading_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(readings)
}

/// Compare the running total against a full scan of the site's readings
///
/// Verification only; the write path never does this.
pub fn audit_site_total(conn: &Connection, site_id: &Uuid) -> Result<Option<TotalAudit>, StoreError> {
    let Some(site) = get_site(conn, site_id)? else {
        return Ok(None);
    };

    let (scanned_units, readings_count): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(value), 0), COUNT(*) FROM readings WHERE site_id = ?1",
        params![site_id.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let scanned_total = Emission::from_units(scanned_units);
    let consistent = scanned_total == site.total_emissions_to_date;

    if !consistent {
        log::error!(
            "❌ Running total mismatch for site {}: running={} scanned={}",
            site.id,
            site.total_emissions_to_date,
            scanned_total
        );
    }

    Ok(Some(TotalAudit {
        site_id: site.id,
        running_total: site.total_emissions_to_date,
        scanned_total,
        readings_count,
        consistent,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;
    use crate::types::ComplianceStatus;

    fn alpha() -> NewSite {
        NewSite {
            name: "Well Pad Alpha".to_string(),
            location: "Alberta, Canada".to_string(),
            emission_limit: "5000".parse().unwrap(),
        }
    }

    #[test]
    fn test_insert_and_get_site() {
        let (_dir, store) = temp_store();
        let conn = store.connect().unwrap();

        let created = insert_site(&conn, &alpha(), Utc::now()).unwrap();
        assert!(created.total_emissions_to_date.is_zero());

        let fetched = get_site(&conn, &created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.compliance_status(), ComplianceStatus::WithinLimit);

        assert!(get_site(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_list_sites() {
        let (_dir, store) = temp_store();
        let conn = store.connect().unwrap();

        insert_site(&conn, &alpha(), Utc::now()).unwrap();
        let mut beta = alpha();
        beta.name = "Processing Plant Beta".to_string();
        insert_site(&conn, &beta, Utc::now()).unwrap();

        assert_eq!(list_sites(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_metrics_without_readings() {
        let (_dir, store) = temp_store();
        let conn = store.connect().unwrap();
        let site = insert_site(&conn, &alpha(), Utc::now()).unwrap();

        let metrics = site_metrics(&conn, &site.id).unwrap().unwrap();
        assert_eq!(metrics.readings_count, 0);
        assert!(metrics.last_reading_at.is_none());
        assert_eq!(metrics.status, ComplianceStatus::WithinLimit);

        assert!(site_metrics(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_recent_readings_limit() {
        let (_dir, store) = temp_store();
        let conn = store.connect().unwrap();
        let site = insert_site(&conn, &alpha(), Utc::now()).unwrap();

        for (i, ts) in [3_000_i64, 1_000, 2_000].iter().enumerate() {
            conn.execute(
                "INSERT INTO readings (site_id, value, recorded_at, idempotency_key, created_at)
                 VALUES (?1, 10000, ?2, ?3, 0)",
                params![site.id.to_string(), ts, format!("k:{}", i)],
            )
            .unwrap();
        }

        let newest = recent_readings(&conn, &site.id, 1).unwrap();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].recorded_at.timestamp_millis(), 3_000);

        let all = recent_readings(&conn, &site.id, usize::MAX).unwrap();
        let order: Vec<i64> = all.iter().map(|r| r.recorded_at.timestamp_millis()).collect();
        assert_eq!(order, vec![3_000, 2_000, 1_000]);

        assert!(recent_readings(&conn, &site.id, 0).unwrap().is_empty());
    }

    #[test]
    fn test_audit_detects_drift() {
        let (_dir, store) = temp_store();
        let conn = store.connect().unwrap();
        let site = insert_site(&conn, &alpha(), Utc::now()).unwrap();

        let audit = audit_site_total(&conn, &site.id).unwrap().unwrap();
        assert!(audit.consistent);

        // Simulate a writer that bypassed the ingestion path
        conn.execute(
            "UPDATE sites SET total_emissions_to_date = 42 WHERE id = ?1",
            params![site.id.to_string()],
        )
        .unwrap();

        let audit = audit_site_total(&conn, &site.id).unwrap().unwrap();
        assert!(!audit.consistent);
        assert_eq!(audit.running_total, Emission::from_units(42));
        assert!(audit.scanned_total.is_zero());
    }
}
