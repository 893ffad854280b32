//! Database access for EntoLab
//!
//! Shared SQLite pool initialization and schema management. Repository
//! functions live in the service crate; this module owns the connection and
//! the table definitions.

pub mod init;
pub mod models;

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize the database connection pool, creating the file and schema on
/// first use.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init::create_all_tables(&pool).await?;

    Ok(pool)
}

/// In-memory pool with full schema, for tests
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePool::connect("sqlite::memory:").await?;
    init::create_all_tables(&pool).await?;
    Ok(pool)
}

/// Parse an RFC 3339 timestamp column into UTC
pub fn parse_timestamp(raw: &str, column: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| crate::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
