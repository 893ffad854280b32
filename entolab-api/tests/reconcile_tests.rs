//! Database-level tests for annotation reconciliation and PMI refresh
//!
//! Exercises `commit_detections` and `refresh_analysis` directly against
//! an in-memory database, below the HTTP layer.

use chrono::Utc;
use entolab_common::db::models::{Detection, DetectionSource};
use entolab_common::pmi::LifeStage;
use sqlx::SqlitePool;
use uuid::Uuid;

use entolab_api::db;
use entolab_api::services::reconcile::{self, DraftDetection};

struct Fixture {
    pool: SqlitePool,
    case: entolab_common::db::models::Case,
    upload_guid: Uuid,
}

async fn fixture(ambient_temp_c: f64) -> Fixture {
    let pool = entolab_common::db::init_memory_pool().await.unwrap();

    let user = db::users::create_user(&pool, "analyst", "hash", "salt")
        .await
        .unwrap();
    let case = db::cases::create_case(
        &pool,
        user.guid,
        "Reconcile case",
        "",
        ambient_temp_c,
        Utc::now(),
        None,
    )
    .await
    .unwrap();
    let upload_guid = Uuid::new_v4();
    db::uploads::create_upload(
        &pool,
        upload_guid,
        case.guid,
        "specimen.jpg",
        "image/jpeg",
        1024,
        "cases/x/uploads/y/specimen.jpg",
    )
    .await
    .unwrap();

    Fixture {
        pool,
        case,
        upload_guid,
    }
}

async fn insert_model_detection(
    fx: &Fixture,
    stage: LifeStage,
    species: Option<&str>,
) -> Detection {
    let now = Utc::now();
    let detection = Detection {
        guid: Uuid::new_v4(),
        upload_guid: fx.upload_guid,
        x: 0.2,
        y: 0.2,
        width: 0.1,
        height: 0.1,
        life_stage: stage,
        species: species.map(|s| s.to_string()),
        confidence: Some(0.8),
        source: DetectionSource::Model,
        edited: false,
        created_at: now,
        updated_at: now,
    };
    db::detections::insert_detection(&fx.pool, &detection)
        .await
        .unwrap();
    detection
}

#[tokio::test]
async fn test_commit_applies_adds_edits_and_deletes() {
    let fx = fixture(25.0).await;
    let kept = insert_model_detection(&fx, LifeStage::Instar1, Some("lucilia_sericata")).await;
    let dropped = insert_model_detection(&fx, LifeStage::Egg, None).await;

    let mut edited = DraftDetection::from_detection(&kept);
    edited.life_stage = LifeStage::Instar2;
    let draft = vec![
        edited,
        DraftDetection {
            guid: None,
            x: 0.6,
            y: 0.6,
            width: 0.1,
            height: 0.1,
            life_stage: LifeStage::Instar3,
            species: Some("lucilia_sericata".to_string()),
        },
    ];

    let outcome = reconcile::commit_detections(&fx.pool, &fx.case, fx.upload_guid, &draft)
        .await
        .unwrap();
    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.deleted, 1);
    assert!(outcome.pmi_recomputed);

    let live = db::detections::list_for_upload(&fx.pool, fx.upload_guid)
        .await
        .unwrap();
    assert_eq!(live.len(), 2);
    assert!(live.iter().all(|d| d.guid != dropped.guid));

    // The modified model box is now protected from re-runs
    let modified = live.iter().find(|d| d.guid == kept.guid).unwrap();
    assert!(modified.edited);
    assert_eq!(modified.life_stage, LifeStage::Instar2);
    assert_eq!(modified.source, DetectionSource::Model);

    let added = live.iter().find(|d| d.guid != kept.guid).unwrap();
    assert_eq!(added.source, DetectionSource::Human);
    assert!(!added.edited);
}

#[tokio::test]
async fn test_edited_model_detections_survive_replacement() {
    let fx = fixture(25.0).await;
    let edited_box = insert_model_detection(&fx, LifeStage::Instar1, None).await;
    insert_model_detection(&fx, LifeStage::Egg, None).await;

    // Human touches one box
    let mut draft: Vec<DraftDetection> = db::detections::list_for_upload(&fx.pool, fx.upload_guid)
        .await
        .unwrap()
        .iter()
        .map(DraftDetection::from_detection)
        .collect();
    for item in &mut draft {
        if item.guid == Some(edited_box.guid) {
            item.species = Some("calliphora_vicina".to_string());
        }
    }
    reconcile::commit_detections(&fx.pool, &fx.case, fx.upload_guid, &draft)
        .await
        .unwrap();

    // A re-run clears only the untouched model output
    let replaced = db::detections::replace_model_detections(&fx.pool, fx.upload_guid, &[])
        .await
        .unwrap();
    assert_eq!(replaced, 1);

    let live = db::detections::list_for_upload(&fx.pool, fx.upload_guid)
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].guid, edited_box.guid);
}

#[tokio::test]
async fn test_failed_replacement_leaves_prior_detections_intact() {
    let fx = fixture(25.0).await;
    let prior = insert_model_detection(&fx, LifeStage::Instar1, Some("lucilia_sericata")).await;

    // Two fresh rows sharing a guid: the second insert violates the
    // primary key, so the whole replacement must roll back
    let now = Utc::now();
    let colliding = Uuid::new_v4();
    let fresh: Vec<Detection> = [0.1, 0.5]
        .iter()
        .map(|&x| Detection {
            guid: colliding,
            upload_guid: fx.upload_guid,
            x,
            y: 0.3,
            width: 0.1,
            height: 0.1,
            life_stage: LifeStage::Instar2,
            species: None,
            confidence: Some(0.7),
            source: DetectionSource::Model,
            edited: false,
            created_at: now,
            updated_at: now,
        })
        .collect();

    let result = db::detections::replace_model_detections(&fx.pool, fx.upload_guid, &fresh).await;
    assert!(result.is_err());

    // The prior model output is still live; nothing from the failed run landed
    let live = db::detections::list_for_upload(&fx.pool, fx.upload_guid)
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].guid, prior.guid);
}

#[tokio::test]
async fn test_replacement_swaps_model_output() {
    let fx = fixture(25.0).await;
    insert_model_detection(&fx, LifeStage::Egg, None).await;
    insert_model_detection(&fx, LifeStage::Instar1, None).await;

    let now = Utc::now();
    let fresh = vec![Detection {
        guid: Uuid::new_v4(),
        upload_guid: fx.upload_guid,
        x: 0.4,
        y: 0.4,
        width: 0.1,
        height: 0.1,
        life_stage: LifeStage::Instar3,
        species: Some("lucilia_sericata".to_string()),
        confidence: Some(0.92),
        source: DetectionSource::Model,
        edited: false,
        created_at: now,
        updated_at: now,
    }];

    let replaced = db::detections::replace_model_detections(&fx.pool, fx.upload_guid, &fresh)
        .await
        .unwrap();
    assert_eq!(replaced, 2);

    let live = db::detections::list_for_upload(&fx.pool, fx.upload_guid)
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].life_stage, LifeStage::Instar3);
}

#[tokio::test]
async fn test_commit_unchanged_stage_keeps_estimate() {
    let fx = fixture(25.0).await;
    insert_model_detection(&fx, LifeStage::Pupa, Some("lucilia_sericata")).await;

    let baseline: Vec<DraftDetection> = db::detections::list_for_upload(&fx.pool, fx.upload_guid)
        .await
        .unwrap()
        .iter()
        .map(DraftDetection::from_detection)
        .collect();

    let first = reconcile::commit_detections(&fx.pool, &fx.case, fx.upload_guid, &baseline)
        .await
        .unwrap();
    assert!(first.pmi_recomputed);
    let first_computed_at = first.analysis.as_ref().unwrap().computed_at;

    // Add a younger box; the oldest stage does not move
    let mut draft = baseline.clone();
    draft.push(DraftDetection {
        guid: None,
        x: 0.8,
        y: 0.8,
        width: 0.05,
        height: 0.05,
        life_stage: LifeStage::Egg,
        species: None,
    });
    let second = reconcile::commit_detections(&fx.pool, &fx.case, fx.upload_guid, &draft)
        .await
        .unwrap();
    assert!(!second.pmi_recomputed);
    assert_eq!(
        second.analysis.as_ref().unwrap().computed_at,
        first_computed_at
    );
}

#[tokio::test]
async fn test_commit_empty_draft_clears_estimate() {
    let fx = fixture(25.0).await;
    insert_model_detection(&fx, LifeStage::Instar3, Some("lucilia_sericata")).await;

    let baseline: Vec<DraftDetection> = db::detections::list_for_upload(&fx.pool, fx.upload_guid)
        .await
        .unwrap()
        .iter()
        .map(DraftDetection::from_detection)
        .collect();
    reconcile::commit_detections(&fx.pool, &fx.case, fx.upload_guid, &baseline)
        .await
        .unwrap();
    assert!(db::analyses::get_result(&fx.pool, fx.case.guid)
        .await
        .unwrap()
        .is_some());

    let outcome = reconcile::commit_detections(&fx.pool, &fx.case, fx.upload_guid, &[])
        .await
        .unwrap();
    assert_eq!(outcome.deleted, 1);
    assert!(outcome.pmi_recomputed);
    assert!(outcome.analysis.is_none());
    assert!(db::analyses::get_result(&fx.pool, fx.case.guid)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_unknown_species_uses_conservative_estimate() {
    let fx = fixture(25.0).await;
    insert_model_detection(&fx, LifeStage::Instar2, Some("unidentified_diptera")).await;

    let (analysis, recomputed) = reconcile::refresh_analysis(&fx.pool, &fx.case)
        .await
        .unwrap();
    assert!(recomputed);
    let analysis = analysis.unwrap();
    assert_eq!(analysis.oldest_stage, LifeStage::Instar2);
    assert_eq!(analysis.species.as_deref(), Some("unidentified_diptera"));
    // Conservative fallback: widest interval over the known species tables
    assert!(analysis.pmi_min_hours > 0.0);
    assert!(analysis.pmi_max_hours.unwrap() > analysis.pmi_min_hours);
}

#[tokio::test]
async fn test_below_base_temperature_yields_no_estimate() {
    // 5 °C ambient is below every species' development threshold
    let fx = fixture(5.0).await;
    insert_model_detection(&fx, LifeStage::Instar1, Some("lucilia_sericata")).await;

    let (analysis, _) = reconcile::refresh_analysis(&fx.pool, &fx.case).await.unwrap();
    assert!(analysis.is_none());
    assert!(db::analyses::get_result(&fx.pool, fx.case.guid)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_refresh_is_idempotent_without_changes() {
    let fx = fixture(25.0).await;
    insert_model_detection(&fx, LifeStage::Adult, Some("chrysomya_megacephala")).await;

    let (first, recomputed) = reconcile::refresh_analysis(&fx.pool, &fx.case).await.unwrap();
    assert!(recomputed);
    // Adult has an open upper bound
    assert!(first.as_ref().unwrap().pmi_max_hours.is_none());

    let (second, recomputed) = reconcile::refresh_analysis(&fx.pool, &fx.case).await.unwrap();
    assert!(!recomputed);
    assert_eq!(
        second.unwrap().computed_at,
        first.unwrap().computed_at
    );
}
