//! Database schema creation
//!
//! All tables are created idempotently (`CREATE TABLE IF NOT EXISTS`) at
//! startup. UUID keys are stored as TEXT, timestamps as RFC 3339 TEXT, and
//! soft deletes use a nullable `deleted_at` column.

use crate::Result;
use sqlx::SqlitePool;

/// Create all EntoLab tables
pub async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_recovery_codes_table(pool).await?;
    create_sessions_table(pool).await?;
    create_cases_table(pool).await?;
    create_uploads_table(pool).await?;
    create_detections_table(pool).await?;
    create_analysis_results_table(pool).await?;
    create_exports_table(pool).await?;
    create_settings_table(pool).await?;

    tracing::info!("Database tables initialized");
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_recovery_codes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recovery_codes (
            guid TEXT PRIMARY KEY,
            user_guid TEXT NOT NULL REFERENCES users(guid),
            code_hash TEXT NOT NULL,
            consumed_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    // Only the SHA-256 digest of the session token is stored
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_guid TEXT NOT NULL REFERENCES users(guid),
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_cases_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cases (
            guid TEXT PRIMARY KEY,
            user_guid TEXT NOT NULL REFERENCES users(guid),
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            ambient_temp_c REAL NOT NULL,
            discovered_at TEXT NOT NULL,
            location_name TEXT,
            latitude REAL,
            longitude REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_uploads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS uploads (
            guid TEXT PRIMARY KEY,
            case_guid TEXT NOT NULL REFERENCES cases(guid),
            filename TEXT NOT NULL,
            content_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            object_key TEXT NOT NULL,
            stored INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_detections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS detections (
            guid TEXT PRIMARY KEY,
            upload_guid TEXT NOT NULL REFERENCES uploads(guid),
            x REAL NOT NULL,
            y REAL NOT NULL,
            width REAL NOT NULL,
            height REAL NOT NULL,
            life_stage TEXT NOT NULL,
            species TEXT,
            confidence REAL,
            source TEXT NOT NULL,
            edited INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_analysis_results_table(pool: &SqlitePool) -> Result<()> {
    // One current PMI estimate per case, upserted on recomputation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_results (
            case_guid TEXT PRIMARY KEY REFERENCES cases(guid),
            oldest_stage TEXT NOT NULL,
            species TEXT,
            pmi_min_hours REAL NOT NULL,
            pmi_max_hours REAL,
            ambient_temp_c REAL NOT NULL,
            computed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_exports_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exports (
            guid TEXT PRIMARY KEY,
            case_guid TEXT NOT NULL REFERENCES cases(guid),
            format TEXT NOT NULL,
            object_key TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            deleted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
