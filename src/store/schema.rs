//! Schema migration loader

use crate::error::StoreError;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

/// Run schema migrations from SQL files
///
/// Reads all .sql files from `schema_dir`, sorted by file name
/// (00_, 01_, 02_, ...), and executes each one. Every file must use
/// "IF NOT EXISTS" clauses so re-running is a no-op.
///
/// All files run inside one transaction: a half-migrated schema is never
/// left behind.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> Result<(), StoreError> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.is_dir() {
        return Err(StoreError::Schema(format!(
            "Schema directory not found: {}",
            schema_dir
        )));
    }

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    if sql_files.is_empty() {
        return Err(StoreError::Schema(format!("No .sql files in {}", schema_dir)));
    }

    sql_files.sort();

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    let tx = conn.transaction()?;
    for path in &sql_files {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        log::debug!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(path)?;
        tx.execute_batch(&sql_content)
            .map_err(|e| StoreError::Schema(format!("{}: {}", filename, e)))?;
    }
    tx.commit()?;

    log::info!("✅ {} schema files applied", sql_files.len());

    Ok(())
}
