//! Export record database operations

use chrono::Utc;
use entolab_common::db::models::{ExportFormat, ExportRecord};
use entolab_common::db::parse_timestamp;
use entolab_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

fn row_to_export(row: &sqlx::sqlite::SqliteRow) -> Result<ExportRecord> {
    let guid: String = row.get("guid");
    let case_guid: String = row.get("case_guid");
    let format: String = row.get("format");
    let created_at: String = row.get("created_at");

    Ok(ExportRecord {
        guid: parse_uuid(&guid, "exports.guid")?,
        case_guid: parse_uuid(&case_guid, "exports.case_guid")?,
        format: ExportFormat::parse(&format).ok_or_else(|| {
            entolab_common::Error::Internal(format!("Unknown export format in row: {}", format))
        })?,
        object_key: row.get("object_key"),
        size_bytes: row.get("size_bytes"),
        created_at: parse_timestamp(&created_at, "exports.created_at")?,
    })
}

/// Insert an export record
pub async fn create_export(
    pool: &SqlitePool,
    guid: Uuid,
    case_guid: Uuid,
    format: ExportFormat,
    object_key: &str,
    size_bytes: i64,
) -> Result<ExportRecord> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO exports (guid, case_guid, format, object_key, size_bytes, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(case_guid.to_string())
    .bind(format.as_str())
    .bind(object_key)
    .bind(size_bytes)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(ExportRecord {
        guid,
        case_guid,
        format,
        object_key: object_key.to_string(),
        size_bytes,
        created_at: now,
    })
}

/// Fetch a live export record
pub async fn get_export(pool: &SqlitePool, guid: Uuid) -> Result<Option<ExportRecord>> {
    let row = sqlx::query("SELECT * FROM exports WHERE guid = ? AND deleted_at IS NULL")
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_export).transpose()
}

/// List a case's live exports, newest first
pub async fn list_exports(pool: &SqlitePool, case_guid: Uuid) -> Result<Vec<ExportRecord>> {
    let rows = sqlx::query(
        "SELECT * FROM exports WHERE case_guid = ? AND deleted_at IS NULL ORDER BY created_at DESC",
    )
    .bind(case_guid.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_export).collect()
}

/// Soft-delete an export record
pub async fn soft_delete_export(pool: &SqlitePool, guid: Uuid) -> Result<()> {
    sqlx::query("UPDATE exports SET deleted_at = ? WHERE guid = ? AND deleted_at IS NULL")
        .bind(Utc::now().to_rfc3339())
        .bind(guid.to_string())
        .execute(pool)
        .await?;

    Ok(())
}
