//! Methane Ingest - operator CLI
//!
//! Usage:
//!   methane_ingest migrate
//!   methane_ingest seed
//!   methane_ingest create-site --name "Well Pad Alpha" --location "Alberta, Canada" --limit 5000
//!   methane_ingest ingest --file batch.json      (use `-` for stdin)
//!   methane_ingest metrics <site-id>
//!
//! Results are printed as JSON on stdout; logs go to stderr.
//!
//! Environment variables:
//!   METHANE_DB_PATH - SQLite database path (default: data/methane.db)
//!   METHANE_SCHEMA_DIR - migration directory (default: sql)
//!   METHANE_LOCK_TIMEOUT_MS - write lock wait (default: 5000)
//!   METHANE_ENABLE_WAL - WAL journal mode (default: true)

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info};
use methane_ingest::{
    Emission, IngestConfig, IngestError, IngestRequest, IngestionService, NewSite, SiteRegistry,
    SqliteStore,
};
use serde::Serialize;
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "methane_ingest", about = "Idempotent methane emission ingestion", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override METHANE_DB_PATH
    #[arg(long, global = true)]
    db: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    Migrate,

    /// Register the demo sites (only if no sites exist)
    Seed,

    /// Register a new site
    CreateSite {
        #[arg(long)]
        name: String,

        #[arg(long)]
        location: String,

        /// Emission limit in kg
        #[arg(long)]
        limit: Emission,
    },

    /// List all sites
    ListSites,

    /// Running total, compliance status and reading stats for a site
    Metrics { site_id: Uuid },

    /// Most recent readings for a site
    Readings {
        site_id: Uuid,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Ingest one batch from a JSON file
    Ingest {
        /// Path to an IngestRequest JSON document, or `-` for stdin
        #[arg(long)]
        file: PathBuf,
    },

    /// Compare a site's running total against a full scan of its readings
    Audit { site_id: Uuid },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = IngestConfig::from_env();
    if let Some(db) = cli.db {
        config = config.with_db_path(db);
    }

    info!("🚀 Methane Ingest");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Schema dir: {}", config.schema_dir);
    info!("   └─ Lock timeout: {}ms", config.lock_timeout_ms);

    let store = SqliteStore::open(config)?;
    let registry = SiteRegistry::new(store.clone());

    let result = match cli.command {
        Commands::Migrate => Ok(json!({ "migrated": true })),
        Commands::Seed => registry.seed_demo_sites().await.and_then(to_json),
        Commands::CreateSite { name, location, limit } => registry
            .create_site(NewSite { name, location, emission_limit: limit })
            .await
            .and_then(to_json),
        Commands::ListSites => registry.list_sites().await.and_then(to_json),
        Commands::Metrics { site_id } => registry.site_metrics(site_id).await.and_then(to_json),
        Commands::Readings { site_id, limit } => {
            registry.recent_readings(site_id, limit).await.and_then(to_json)
        }
        Commands::Ingest { file } => {
            let request = read_request(&file)?;
            IngestionService::new(store).ingest(request).await.and_then(to_json)
        }
        Commands::Audit { site_id } => registry.audit_site_total(site_id).await.and_then(to_json),
    };

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!("❌ {}", e);
            let body = json!({
                "error": e.code(),
                "message": e.to_string(),
                "retryable": e.is_retryable(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            std::process::exit(if e.is_client_error() { 2 } else { 1 });
        }
    }
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, IngestError> {
    serde_json::to_value(value).map_err(|e| IngestError::Internal(e.to_string()))
}

fn read_request(path: &PathBuf) -> Result<IngestRequest, Box<dyn std::error::Error>> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}
