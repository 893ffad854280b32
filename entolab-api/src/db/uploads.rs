//! Upload database operations

use chrono::Utc;
use entolab_common::db::models::Upload;
use entolab_common::db::parse_timestamp;
use entolab_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

fn row_to_upload(row: &sqlx::sqlite::SqliteRow) -> Result<Upload> {
    let guid: String = row.get("guid");
    let case_guid: String = row.get("case_guid");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Upload {
        guid: parse_uuid(&guid, "uploads.guid")?,
        case_guid: parse_uuid(&case_guid, "uploads.case_guid")?,
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        size_bytes: row.get("size_bytes"),
        object_key: row.get("object_key"),
        stored: row.get::<i64, _>("stored") != 0,
        created_at: parse_timestamp(&created_at, "uploads.created_at")?,
        updated_at: parse_timestamp(&updated_at, "uploads.updated_at")?,
    })
}

/// Insert a new upload row (object not yet stored)
pub async fn create_upload(
    pool: &SqlitePool,
    guid: Uuid,
    case_guid: Uuid,
    filename: &str,
    content_type: &str,
    size_bytes: i64,
    object_key: &str,
) -> Result<Upload> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO uploads (
            guid, case_guid, filename, content_type, size_bytes, object_key,
            stored, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(case_guid.to_string())
    .bind(filename)
    .bind(content_type)
    .bind(size_bytes)
    .bind(object_key)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(Upload {
        guid,
        case_guid,
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        size_bytes,
        object_key: object_key.to_string(),
        stored: false,
        created_at: now,
        updated_at: now,
    })
}

/// Fetch a live upload
pub async fn get_upload(pool: &SqlitePool, guid: Uuid) -> Result<Option<Upload>> {
    let row = sqlx::query("SELECT * FROM uploads WHERE guid = ? AND deleted_at IS NULL")
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_upload).transpose()
}

/// List a case's live uploads, newest first
pub async fn list_uploads(pool: &SqlitePool, case_guid: Uuid) -> Result<Vec<Upload>> {
    let rows = sqlx::query(
        "SELECT * FROM uploads WHERE case_guid = ? AND deleted_at IS NULL ORDER BY created_at DESC",
    )
    .bind(case_guid.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_upload).collect()
}

/// Mark the object as confirmed stored by the client
pub async fn mark_stored(pool: &SqlitePool, guid: Uuid) -> Result<()> {
    sqlx::query("UPDATE uploads SET stored = 1, updated_at = ? WHERE guid = ? AND deleted_at IS NULL")
        .bind(Utc::now().to_rfc3339())
        .bind(guid.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Soft-delete an upload
pub async fn soft_delete_upload(pool: &SqlitePool, guid: Uuid) -> Result<()> {
    sqlx::query("UPDATE uploads SET deleted_at = ? WHERE guid = ? AND deleted_at IS NULL")
        .bind(Utc::now().to_rfc3339())
        .bind(guid.to_string())
        .execute(pool)
        .await?;

    Ok(())
}
