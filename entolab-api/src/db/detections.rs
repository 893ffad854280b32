//! Detection database operations

use chrono::Utc;
use entolab_common::db::models::{Detection, DetectionSource};
use entolab_common::db::parse_timestamp;
use entolab_common::pmi::LifeStage;
use entolab_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

pub(crate) fn row_to_detection(row: &sqlx::sqlite::SqliteRow) -> Result<Detection> {
    let guid: String = row.get("guid");
    let upload_guid: String = row.get("upload_guid");
    let life_stage: String = row.get("life_stage");
    let source: String = row.get("source");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Detection {
        guid: parse_uuid(&guid, "detections.guid")?,
        upload_guid: parse_uuid(&upload_guid, "detections.upload_guid")?,
        x: row.get("x"),
        y: row.get("y"),
        width: row.get("width"),
        height: row.get("height"),
        life_stage: LifeStage::parse(&life_stage).ok_or_else(|| {
            entolab_common::Error::Internal(format!("Unknown life stage in row: {}", life_stage))
        })?,
        species: row.get("species"),
        confidence: row.get("confidence"),
        source: DetectionSource::parse(&source).ok_or_else(|| {
            entolab_common::Error::Internal(format!("Unknown detection source in row: {}", source))
        })?,
        edited: row.get::<i64, _>("edited") != 0,
        created_at: parse_timestamp(&created_at, "detections.created_at")?,
        updated_at: parse_timestamp(&updated_at, "detections.updated_at")?,
    })
}

fn insert_query(
    detection: &Detection,
) -> sqlx::query::Query<'static, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'static>> {
    sqlx::query(
        r#"
        INSERT INTO detections (
            guid, upload_guid, x, y, width, height, life_stage, species,
            confidence, source, edited, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(detection.guid.to_string())
    .bind(detection.upload_guid.to_string())
    .bind(detection.x)
    .bind(detection.y)
    .bind(detection.width)
    .bind(detection.height)
    .bind(detection.life_stage.as_str())
    .bind(detection.species.clone())
    .bind(detection.confidence)
    .bind(detection.source.as_str())
    .bind(detection.edited as i64)
    .bind(detection.created_at.to_rfc3339())
    .bind(detection.updated_at.to_rfc3339())
}

/// Insert a detection row
pub async fn insert_detection(pool: &SqlitePool, detection: &Detection) -> Result<()> {
    insert_query(detection).execute(pool).await?;
    Ok(())
}

/// Live detections on an upload, oldest row first
pub async fn list_for_upload(pool: &SqlitePool, upload_guid: Uuid) -> Result<Vec<Detection>> {
    let rows = sqlx::query(
        "SELECT * FROM detections WHERE upload_guid = ? AND deleted_at IS NULL ORDER BY created_at",
    )
    .bind(upload_guid.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_detection).collect()
}

/// Live detections across all live uploads of a case
pub async fn list_for_case(pool: &SqlitePool, case_guid: Uuid) -> Result<Vec<Detection>> {
    let rows = sqlx::query(
        r#"
        SELECT d.* FROM detections d
        JOIN uploads u ON u.guid = d.upload_guid
        WHERE u.case_guid = ? AND u.deleted_at IS NULL AND d.deleted_at IS NULL
        ORDER BY d.created_at
        "#,
    )
    .bind(case_guid.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_detection).collect()
}

/// Replace an upload's unedited model detections with a fresh run's output.
///
/// Human-drawn and human-edited boxes survive. Runs as a single
/// transaction: either the old model output is cleared and the whole fresh
/// set lands, or nothing changes. Returns the number of rows cleared.
pub async fn replace_model_detections(
    pool: &SqlitePool,
    upload_guid: Uuid,
    fresh: &[Detection],
) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let cleared = sqlx::query(
        r#"
        UPDATE detections
        SET deleted_at = ?
        WHERE upload_guid = ? AND source = 'model' AND edited = 0 AND deleted_at IS NULL
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(upload_guid.to_string())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    for detection in fresh {
        insert_query(detection).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(cleared)
}
