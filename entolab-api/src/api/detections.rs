//! Detection run and listing endpoints
//!
//! A detection run hands the specimen image to the external model service
//! and replaces the upload's previous unedited model detections with the
//! fresh results. Human-drawn and human-edited boxes survive re-runs.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use entolab_common::db::models::{AnalysisResult, Detection, DetectionSource};
use entolab_common::events::EntoEvent;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{load_owned_case, load_owned_upload};
use crate::auth::CurrentUser;
use crate::db;
use crate::services::detector_client::DetectorError;
use crate::services::reconcile;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct DetectionRunResponse {
    pub upload_id: Uuid,
    /// Unedited model detections removed by this run
    pub replaced: u64,
    /// All live detections on the upload after the run
    pub detections: Vec<Detection>,
    pub analysis: Option<AnalysisResult>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub case_id: Uuid,
    pub analysis: Option<AnalysisResult>,
}

fn map_detector_error(e: DetectorError) -> ApiError {
    match e {
        DetectorError::InvalidApiKey => {
            ApiError::Internal("Detection service rejected the configured API key".to_string())
        }
        DetectorError::ApiError(status, body) => {
            ApiError::Upstream(format!("Detection service returned {}: {}", status, body))
        }
        DetectorError::NetworkError(msg) | DetectorError::ParseError(msg) => {
            ApiError::Upstream(format!("Detection service unavailable: {}", msg))
        }
    }
}

/// POST /api/cases/:case_id/uploads/:upload_id/detect
pub async fn run_detection(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((case_id, upload_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<DetectionRunResponse>> {
    let (case, upload) = load_owned_upload(&state, current.user.guid, case_id, upload_id).await?;

    if !upload.stored {
        return Err(ApiError::Conflict(
            "Upload has not been completed yet".to_string(),
        ));
    }

    state.event_bus.emit(EntoEvent::AnalysisStarted {
        case_id: case.guid,
        upload_id: upload.guid,
        timestamp: Utc::now(),
    });

    let image_url = match state.storage.presign_get(&upload.object_key).await {
        Ok(url) => url,
        Err(e) => {
            let message = format!("Presigning failed: {}", e);
            state.record_error(message.clone()).await;
            state.event_bus.emit(EntoEvent::AnalysisFailed {
                case_id: case.guid,
                upload_id: upload.guid,
                message: message.clone(),
                timestamp: Utc::now(),
            });
            return Err(ApiError::Internal(message));
        }
    };

    let model_detections = match state.detector.detect(&image_url).await {
        Ok(detections) => detections,
        Err(e) => {
            warn!(upload = %upload.guid, "Detection run failed: {}", e);
            let api_error = map_detector_error(e);
            state.record_error(api_error.to_string()).await;
            state.event_bus.emit(EntoEvent::AnalysisFailed {
                case_id: case.guid,
                upload_id: upload.guid,
                message: api_error.to_string(),
                timestamp: Utc::now(),
            });
            return Err(api_error);
        }
    };

    // Replace prior unedited model output; human work is untouched.
    // One transaction: a failed write leaves the prior set intact.
    let now = Utc::now();
    let fresh: Vec<Detection> = model_detections
        .iter()
        .map(|m| Detection {
            guid: Uuid::new_v4(),
            upload_guid: upload.guid,
            x: m.x,
            y: m.y,
            width: m.width,
            height: m.height,
            life_stage: m.life_stage,
            species: m.species.clone(),
            confidence: m.confidence,
            source: DetectionSource::Model,
            edited: false,
            created_at: now,
            updated_at: now,
        })
        .collect();

    let replaced =
        match db::detections::replace_model_detections(&state.db, upload.guid, &fresh).await {
            Ok(replaced) => replaced,
            Err(e) => {
                let message = format!("Failed to store detection results: {}", e);
                state.record_error(message.clone()).await;
                state.event_bus.emit(EntoEvent::AnalysisFailed {
                    case_id: case.guid,
                    upload_id: upload.guid,
                    message: message.clone(),
                    timestamp: Utc::now(),
                });
                return Err(ApiError::Internal(message));
            }
        };

    let (analysis, recomputed) = reconcile::refresh_analysis(&state.db, &case).await?;
    if recomputed {
        if let Some(result) = &analysis {
            state.event_bus.emit(EntoEvent::PmiUpdated {
                case_id: case.guid,
                oldest_stage: result.oldest_stage,
                pmi_min_hours: result.pmi_min_hours,
                pmi_max_hours: result.pmi_max_hours,
                timestamp: Utc::now(),
            });
        }
    }

    state.event_bus.emit(EntoEvent::AnalysisCompleted {
        case_id: case.guid,
        upload_id: upload.guid,
        detection_count: model_detections.len(),
        timestamp: Utc::now(),
    });

    info!(
        upload = %upload.guid,
        count = model_detections.len(),
        replaced,
        "Detection run completed"
    );

    let detections = db::detections::list_for_upload(&state.db, upload.guid).await?;
    Ok(Json(DetectionRunResponse {
        upload_id: upload.guid,
        replaced,
        detections,
        analysis,
    }))
}

/// GET /api/cases/:case_id/uploads/:upload_id/detections
pub async fn list_upload_detections(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((case_id, upload_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<Detection>>> {
    let (_, upload) = load_owned_upload(&state, current.user.guid, case_id, upload_id).await?;
    let detections = db::detections::list_for_upload(&state.db, upload.guid).await?;
    Ok(Json(detections))
}

/// GET /api/cases/:case_id/detections
pub async fn list_case_detections(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(case_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Detection>>> {
    let case = load_owned_case(&state, current.user.guid, case_id).await?;
    let detections = db::detections::list_for_case(&state.db, case.guid).await?;
    Ok(Json(detections))
}

/// GET /api/cases/:case_id/analysis
pub async fn get_analysis(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(case_id): Path<Uuid>,
) -> ApiResult<Json<AnalysisResponse>> {
    let case = load_owned_case(&state, current.user.guid, case_id).await?;
    let analysis = db::analyses::get_result(&state.db, case.guid).await?;
    Ok(Json(AnalysisResponse {
        case_id: case.guid,
        analysis,
    }))
}

/// Build detection routes
pub fn detection_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/cases/:case_id/uploads/:upload_id/detect",
            post(run_detection),
        )
        .route(
            "/api/cases/:case_id/uploads/:upload_id/detections",
            get(list_upload_detections),
        )
        .route("/api/cases/:case_id/detections", get(list_case_detections))
        .route("/api/cases/:case_id/analysis", get(get_analysis))
}
