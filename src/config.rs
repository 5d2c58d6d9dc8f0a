//! Ingestion configuration from environment variables

use std::env;
use std::time::Duration;

/// Runtime configuration for the store and ingestion path
///
/// Loaded from environment variables with sensible defaults. Call
/// `dotenv::dotenv().ok()` first to pick up a `.env` file.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding the `NN_*.sql` schema files
    pub schema_dir: String,

    /// Upper bound on waiting for the site write lock, in milliseconds
    pub lock_timeout_ms: u64,

    /// Run the database in WAL journal mode
    pub enable_wal: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            db_path: "data/methane.db".to_string(),
            schema_dir: "sql".to_string(),
            lock_timeout_ms: 5_000,
            enable_wal: true,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `METHANE_DB_PATH` (default: data/methane.db)
    /// - `METHANE_SCHEMA_DIR` (default: sql)
    /// - `METHANE_LOCK_TIMEOUT_MS` (default: 5000)
    /// - `METHANE_ENABLE_WAL` (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            db_path: env::var("METHANE_DB_PATH").unwrap_or(defaults.db_path),

            schema_dir: env::var("METHANE_SCHEMA_DIR").unwrap_or(defaults.schema_dir),

            lock_timeout_ms: parse_or("METHANE_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms),

            enable_wal: parse_or("METHANE_ENABLE_WAL", defaults.enable_wal),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn with_db_path(mut self, db_path: impl Into<String>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn with_lock_timeout_ms(mut self, lock_timeout_ms: u64) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }
}

fn parse_or<T: std::str::FromStr + std::fmt::Display>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Invalid {} '{}', defaulting to {}", var, raw, default);
            default
        }),
        Err(_) => default,
    }
}
