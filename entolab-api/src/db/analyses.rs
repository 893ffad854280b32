//! Analysis result (PMI estimate) database operations

use entolab_common::db::models::AnalysisResult;
use entolab_common::db::parse_timestamp;
use entolab_common::pmi::LifeStage;
use entolab_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

fn row_to_result(row: &sqlx::sqlite::SqliteRow) -> Result<AnalysisResult> {
    let case_guid: String = row.get("case_guid");
    let oldest_stage: String = row.get("oldest_stage");
    let computed_at: String = row.get("computed_at");

    Ok(AnalysisResult {
        case_guid: parse_uuid(&case_guid, "analysis_results.case_guid")?,
        oldest_stage: LifeStage::parse(&oldest_stage).ok_or_else(|| {
            entolab_common::Error::Internal(format!("Unknown life stage in row: {}", oldest_stage))
        })?,
        species: row.get("species"),
        pmi_min_hours: row.get("pmi_min_hours"),
        pmi_max_hours: row.get("pmi_max_hours"),
        ambient_temp_c: row.get("ambient_temp_c"),
        computed_at: parse_timestamp(&computed_at, "analysis_results.computed_at")?,
    })
}

/// Upsert the case's current PMI estimate
pub async fn upsert_result(pool: &SqlitePool, result: &AnalysisResult) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO analysis_results (
            case_guid, oldest_stage, species, pmi_min_hours, pmi_max_hours,
            ambient_temp_c, computed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(case_guid) DO UPDATE SET
            oldest_stage = excluded.oldest_stage,
            species = excluded.species,
            pmi_min_hours = excluded.pmi_min_hours,
            pmi_max_hours = excluded.pmi_max_hours,
            ambient_temp_c = excluded.ambient_temp_c,
            computed_at = excluded.computed_at
        "#,
    )
    .bind(result.case_guid.to_string())
    .bind(result.oldest_stage.as_str())
    .bind(result.species.clone())
    .bind(result.pmi_min_hours)
    .bind(result.pmi_max_hours)
    .bind(result.ambient_temp_c)
    .bind(result.computed_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch the case's current PMI estimate, if computed
pub async fn get_result(pool: &SqlitePool, case_guid: Uuid) -> Result<Option<AnalysisResult>> {
    let row = sqlx::query("SELECT * FROM analysis_results WHERE case_guid = ?")
        .bind(case_guid.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_result).transpose()
}

/// Drop the stored estimate (no live detections remain)
pub async fn delete_result(pool: &SqlitePool, case_guid: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM analysis_results WHERE case_guid = ?")
        .bind(case_guid.to_string())
        .execute(pool)
        .await?;

    Ok(())
}
