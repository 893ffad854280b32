//! Case database operations

use chrono::{DateTime, Utc};
use entolab_common::db::models::{Case, CaseLocation};
use entolab_common::db::parse_timestamp;
use entolab_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

fn row_to_case(row: &sqlx::sqlite::SqliteRow) -> Result<Case> {
    let guid: String = row.get("guid");
    let user_guid: String = row.get("user_guid");
    let discovered_at: String = row.get("discovered_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let location_name: Option<String> = row.get("location_name");
    let latitude: Option<f64> = row.get("latitude");
    let longitude: Option<f64> = row.get("longitude");
    // Rows satisfy the all-or-none invariant at write time; a name without
    // coordinates here would be a bug upstream
    let location = match (location_name, latitude, longitude) {
        (Some(name), Some(latitude), Some(longitude)) => Some(CaseLocation {
            name,
            latitude,
            longitude,
        }),
        _ => None,
    };

    Ok(Case {
        guid: parse_uuid(&guid, "cases.guid")?,
        user_guid: parse_uuid(&user_guid, "cases.user_guid")?,
        title: row.get("title"),
        description: row.get("description"),
        ambient_temp_c: row.get("ambient_temp_c"),
        discovered_at: parse_timestamp(&discovered_at, "cases.discovered_at")?,
        location,
        created_at: parse_timestamp(&created_at, "cases.created_at")?,
        updated_at: parse_timestamp(&updated_at, "cases.updated_at")?,
    })
}

/// Insert a new case
#[allow(clippy::too_many_arguments)]
pub async fn create_case(
    pool: &SqlitePool,
    user_guid: Uuid,
    title: &str,
    description: &str,
    ambient_temp_c: f64,
    discovered_at: DateTime<Utc>,
    location: Option<&CaseLocation>,
) -> Result<Case> {
    let guid = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO cases (
            guid, user_guid, title, description, ambient_temp_c, discovered_at,
            location_name, latitude, longitude, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(user_guid.to_string())
    .bind(title)
    .bind(description)
    .bind(ambient_temp_c)
    .bind(discovered_at.to_rfc3339())
    .bind(location.map(|l| l.name.clone()))
    .bind(location.map(|l| l.latitude))
    .bind(location.map(|l| l.longitude))
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(Case {
        guid,
        user_guid,
        title: title.to_string(),
        description: description.to_string(),
        ambient_temp_c,
        discovered_at,
        location: location.cloned(),
        created_at: now,
        updated_at: now,
    })
}

/// Fetch a live (not soft-deleted) case
pub async fn get_case(pool: &SqlitePool, guid: Uuid) -> Result<Option<Case>> {
    let row = sqlx::query("SELECT * FROM cases WHERE guid = ? AND deleted_at IS NULL")
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_case).transpose()
}

/// List a user's live cases, newest first
pub async fn list_cases(pool: &SqlitePool, user_guid: Uuid) -> Result<Vec<Case>> {
    let rows = sqlx::query(
        "SELECT * FROM cases WHERE user_guid = ? AND deleted_at IS NULL ORDER BY created_at DESC",
    )
    .bind(user_guid.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_case).collect()
}

/// Update a case's editable fields
#[allow(clippy::too_many_arguments)]
pub async fn update_case(
    pool: &SqlitePool,
    guid: Uuid,
    title: &str,
    description: &str,
    ambient_temp_c: f64,
    discovered_at: DateTime<Utc>,
    location: Option<&CaseLocation>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE cases
        SET title = ?, description = ?, ambient_temp_c = ?, discovered_at = ?,
            location_name = ?, latitude = ?, longitude = ?, updated_at = ?
        WHERE guid = ? AND deleted_at IS NULL
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(ambient_temp_c)
    .bind(discovered_at.to_rfc3339())
    .bind(location.map(|l| l.name.clone()))
    .bind(location.map(|l| l.latitude))
    .bind(location.map(|l| l.longitude))
    .bind(Utc::now().to_rfc3339())
    .bind(guid.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Soft-delete a case. Child uploads and detections become invisible
/// through the ownership chain; their rows are left untouched.
pub async fn soft_delete_case(pool: &SqlitePool, guid: Uuid) -> Result<()> {
    sqlx::query("UPDATE cases SET deleted_at = ? WHERE guid = ? AND deleted_at IS NULL")
        .bind(Utc::now().to_rfc3339())
        .bind(guid.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Guids of all live cases owned by a user (SSE event filtering)
pub async fn owned_case_guids(pool: &SqlitePool, user_guid: Uuid) -> Result<Vec<Uuid>> {
    let rows = sqlx::query("SELECT guid FROM cases WHERE user_guid = ? AND deleted_at IS NULL")
        .bind(user_guid.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            let guid: String = row.get("guid");
            parse_uuid(&guid, "cases.guid")
        })
        .collect()
}
