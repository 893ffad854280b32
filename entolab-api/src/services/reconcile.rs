//! Save-detections reconciliation
//!
//! Diffs a committed annotation draft against the server baseline for an
//! upload, applies the changes in one transaction, recomputes the case's
//! oldest life stage, and recomputes PMI only when that stage (or the
//! species carrying it) actually changed.

use chrono::Utc;
use entolab_common::db::models::{AnalysisResult, Case, Detection, DetectionSource};
use entolab_common::pmi::{self, LifeStage, Species};
use entolab_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::detections::row_to_detection;

/// One bounding box as edited in an annotation session.
///
/// `guid` is present for boxes that exist in the baseline and absent for
/// newly drawn ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftDetection {
    pub guid: Option<Uuid>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub life_stage: LifeStage,
    pub species: Option<String>,
}

impl DraftDetection {
    /// Draft view of a stored detection (session seeding)
    pub fn from_detection(d: &Detection) -> Self {
        Self {
            guid: Some(d.guid),
            x: d.x,
            y: d.y,
            width: d.width,
            height: d.height,
            life_stage: d.life_stage,
            species: d.species.clone(),
        }
    }

    fn matches(&self, d: &Detection) -> bool {
        self.x == d.x
            && self.y == d.y
            && self.width == d.width
            && self.height == d.height
            && self.life_stage == d.life_stage
            && self.species == d.species
    }
}

/// Planned write set for one reconciliation
#[derive(Debug, Default)]
pub struct ChangePlan {
    /// Newly drawn boxes to insert
    pub inserts: Vec<DraftDetection>,
    /// (baseline guid, new content) pairs to update
    pub updates: Vec<(Uuid, DraftDetection)>,
    /// Baseline guids absent from the draft
    pub deletes: Vec<Uuid>,
}

impl ChangePlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Outcome of a committed reconciliation
#[derive(Debug, Serialize)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Current estimate after the commit (None when no live detections
    /// remain or the temperature is below every base)
    pub analysis: Option<AnalysisResult>,
    /// Whether the estimate was recomputed by this commit
    pub pmi_recomputed: bool,
}

/// Diff a draft against the baseline.
///
/// Draft ids that do not exist in the baseline are rejected: the session
/// was seeded from the baseline, so an unknown id means a stale or
/// corrupted draft.
pub fn plan_changes(baseline: &[Detection], draft: &[DraftDetection]) -> Result<ChangePlan> {
    let mut plan = ChangePlan::default();
    let mut seen: Vec<Uuid> = Vec::new();

    for item in draft {
        match item.guid {
            None => plan.inserts.push(item.clone()),
            Some(guid) => {
                let base = baseline.iter().find(|d| d.guid == guid).ok_or_else(|| {
                    Error::InvalidInput(format!("Unknown detection id in draft: {}", guid))
                })?;
                if seen.contains(&guid) {
                    return Err(Error::InvalidInput(format!(
                        "Duplicate detection id in draft: {}",
                        guid
                    )));
                }
                seen.push(guid);
                if !item.matches(base) {
                    plan.updates.push((guid, item.clone()));
                }
            }
        }
    }

    for base in baseline {
        if !seen.contains(&base.guid) {
            plan.deletes.push(base.guid);
        }
    }

    Ok(plan)
}

/// The developmentally most advanced live detection determines the case's
/// oldest stage; the species label riding on it feeds the PMI model.
///
/// Ties on stage prefer a species the development table knows, so the
/// estimate stays species-specific whenever possible.
pub fn oldest_stage_and_species(detections: &[Detection]) -> Option<(LifeStage, Option<String>)> {
    let oldest = detections.iter().map(|d| d.life_stage).max()?;
    let carriers: Vec<&Detection> = detections
        .iter()
        .filter(|d| d.life_stage == oldest)
        .collect();

    let species = carriers
        .iter()
        .filter_map(|d| d.species.as_deref())
        .find(|s| Species::parse(s).is_some())
        .or_else(|| carriers.iter().filter_map(|d| d.species.as_deref()).next())
        .map(|s| s.to_string());

    Some((oldest, species))
}

/// Recompute the case's PMI estimate from its live detections.
///
/// Used after detection runs, which change the committed set without
/// going through an annotation session. Returns the current estimate and
/// whether it was recomputed.
pub async fn refresh_analysis(
    pool: &SqlitePool,
    case: &Case,
) -> Result<(Option<AnalysisResult>, bool)> {
    let live = crate::db::detections::list_for_case(pool, case.guid).await?;
    let prior = crate::db::analyses::get_result(pool, case.guid).await?;

    match oldest_stage_and_species(&live) {
        None => {
            let had_prior = prior.is_some();
            if had_prior {
                crate::db::analyses::delete_result(pool, case.guid).await?;
            }
            Ok((None, had_prior))
        }
        Some((oldest, species)) => {
            if let Some(prior) = &prior {
                if prior.oldest_stage == oldest && prior.species == species {
                    return Ok((Some(prior.clone()), false));
                }
            }
            let parsed = species.as_deref().and_then(Species::parse);
            match pmi::estimate(parsed, oldest, case.ambient_temp_c) {
                Ok(estimate) => {
                    let result = AnalysisResult {
                        case_guid: case.guid,
                        oldest_stage: oldest,
                        species,
                        pmi_min_hours: estimate.min_hours,
                        pmi_max_hours: estimate.max_hours,
                        ambient_temp_c: case.ambient_temp_c,
                        computed_at: Utc::now(),
                    };
                    crate::db::analyses::upsert_result(pool, &result).await?;
                    Ok((Some(result), true))
                }
                Err(e) => {
                    tracing::warn!(case = %case.guid, "PMI unavailable: {}", e);
                    let had_prior = prior.is_some();
                    if had_prior {
                        crate::db::analyses::delete_result(pool, case.guid).await?;
                    }
                    Ok((None, had_prior))
                }
            }
        }
    }
}

/// Apply a committed draft for an upload and refresh the case's PMI
/// estimate when the oldest stage changed. Runs in a single transaction.
pub async fn commit_detections(
    pool: &SqlitePool,
    case: &Case,
    upload_guid: Uuid,
    draft: &[DraftDetection],
) -> Result<ReconcileOutcome> {
    let baseline = crate::db::detections::list_for_upload(pool, upload_guid).await?;
    let plan = plan_changes(&baseline, draft)?;
    let now = Utc::now();
    let now_str = now.to_rfc3339();

    let mut tx = pool.begin().await?;

    for item in &plan.inserts {
        sqlx::query(
            r#"
            INSERT INTO detections (
                guid, upload_guid, x, y, width, height, life_stage, species,
                confidence, source, edited, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, 0, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(upload_guid.to_string())
        .bind(item.x)
        .bind(item.y)
        .bind(item.width)
        .bind(item.height)
        .bind(item.life_stage.as_str())
        .bind(item.species.clone())
        .bind(DetectionSource::Human.as_str())
        .bind(&now_str)
        .bind(&now_str)
        .execute(&mut *tx)
        .await?;
    }

    for (guid, item) in &plan.updates {
        sqlx::query(
            r#"
            UPDATE detections
            SET x = ?, y = ?, width = ?, height = ?, life_stage = ?, species = ?,
                edited = 1, updated_at = ?
            WHERE guid = ? AND deleted_at IS NULL
            "#,
        )
        .bind(item.x)
        .bind(item.y)
        .bind(item.width)
        .bind(item.height)
        .bind(item.life_stage.as_str())
        .bind(item.species.clone())
        .bind(&now_str)
        .bind(guid.to_string())
        .execute(&mut *tx)
        .await?;
    }

    for guid in &plan.deletes {
        sqlx::query("UPDATE detections SET deleted_at = ? WHERE guid = ? AND deleted_at IS NULL")
            .bind(&now_str)
            .bind(guid.to_string())
            .execute(&mut *tx)
            .await?;
    }

    // Recompute oldest stage across the whole case (within the transaction,
    // so the decision sees this commit's writes)
    let rows = sqlx::query(
        r#"
        SELECT d.* FROM detections d
        JOIN uploads u ON u.guid = d.upload_guid
        WHERE u.case_guid = ? AND u.deleted_at IS NULL AND d.deleted_at IS NULL
        "#,
    )
    .bind(case.guid.to_string())
    .fetch_all(&mut *tx)
    .await?;
    let live: Vec<Detection> = rows
        .iter()
        .map(row_to_detection)
        .collect::<Result<Vec<_>>>()?;

    let prior = sqlx::query("SELECT oldest_stage, species FROM analysis_results WHERE case_guid = ?")
        .bind(case.guid.to_string())
        .fetch_optional(&mut *tx)
        .await?;
    let prior: Option<(LifeStage, Option<String>)> = match prior {
        Some(row) => {
            let stage: String = row.get("oldest_stage");
            let species: Option<String> = row.get("species");
            LifeStage::parse(&stage).map(|s| (s, species))
        }
        None => None,
    };

    let mut analysis = None;
    let mut pmi_recomputed = false;

    match oldest_stage_and_species(&live) {
        None => {
            // No live detections: the stored estimate is stale
            if prior.is_some() {
                sqlx::query("DELETE FROM analysis_results WHERE case_guid = ?")
                    .bind(case.guid.to_string())
                    .execute(&mut *tx)
                    .await?;
                pmi_recomputed = true;
            }
        }
        Some((oldest, species)) => {
            if prior.as_ref() != Some(&(oldest, species.clone())) {
                let parsed = species.as_deref().and_then(Species::parse);
                match pmi::estimate(parsed, oldest, case.ambient_temp_c) {
                    Ok(estimate) => {
                        let result = AnalysisResult {
                            case_guid: case.guid,
                            oldest_stage: oldest,
                            species: species.clone(),
                            pmi_min_hours: estimate.min_hours,
                            pmi_max_hours: estimate.max_hours,
                            ambient_temp_c: case.ambient_temp_c,
                            computed_at: now,
                        };
                        sqlx::query(
                            r#"
                            INSERT INTO analysis_results (
                                case_guid, oldest_stage, species, pmi_min_hours,
                                pmi_max_hours, ambient_temp_c, computed_at
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
                        .execute(&mut *tx)
                        .await?;

                        analysis = Some(result);
                        pmi_recomputed = true;
                    }
                    Err(e) => {
                        // Below base temperature: record nothing, keep the
                        // commit; the estimate is simply unavailable
                        tracing::warn!(case = %case.guid, "PMI unavailable: {}", e);
                        sqlx::query("DELETE FROM analysis_results WHERE case_guid = ?")
                            .bind(case.guid.to_string())
                            .execute(&mut *tx)
                            .await?;
                        pmi_recomputed = prior.is_some();
                    }
                }
            }
        }
    }

    tx.commit().await?;

    // Unchanged oldest stage: report the stored estimate as-is
    if analysis.is_none() && !pmi_recomputed {
        analysis = crate::db::analyses::get_result(pool, case.guid).await?;
    }

    Ok(ReconcileOutcome {
        added: plan.inserts.len(),
        updated: plan.updates.len(),
        deleted: plan.deletes.len(),
        analysis,
        pmi_recomputed,
    })
}
