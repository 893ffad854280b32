//! Annotation session endpoints
//!
//! Opening a session seeds an in-memory draft from the upload's stored
//! detections. The client replaces the whole draft on every edit and can
//! step back and forward through a bounded history. Nothing is persisted
//! until commit, which reconciles the draft against the baseline and
//! refreshes the case's PMI estimate.

use axum::extract::{Path, State};
use axum::routing::{delete, post, put};
use axum::{Json, Router};
use chrono::Utc;
use entolab_common::events::EntoEvent;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::load_owned_upload;
use crate::auth::CurrentUser;
use crate::services::annotation::AnnotationSession;
use crate::services::reconcile::{self, DraftDetection, ReconcileOutcome};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct SessionStateResponse {
    pub session_id: Uuid,
    pub case_id: Uuid,
    pub upload_id: Uuid,
    pub draft: Vec<DraftDetection>,
    pub can_undo: bool,
    pub can_redo: bool,
}

impl SessionStateResponse {
    fn from_session(session: &AnnotationSession) -> Self {
        Self {
            session_id: session.guid,
            case_id: session.case_guid,
            upload_id: session.upload_guid,
            draft: session.draft.clone(),
            can_undo: session.can_undo(),
            can_redo: session.can_redo(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplaceDraftRequest {
    pub draft: Vec<DraftDetection>,
}

#[derive(Debug, Serialize)]
pub struct AbandonResponse {
    pub success: bool,
}

fn session_not_found(session_id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Annotation session not found: {}", session_id))
}

/// POST /api/cases/:case_id/uploads/:upload_id/annotation
///
/// Opens a session seeded from the stored detections. An earlier session
/// the user left open on the same upload is discarded.
pub async fn open_session(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((case_id, upload_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<SessionStateResponse>> {
    let (case, upload) = load_owned_upload(&state, current.user.guid, case_id, upload_id).await?;

    let baseline = crate::db::detections::list_for_upload(&state.db, upload.guid).await?;
    let seed: Vec<DraftDetection> = baseline.iter().map(DraftDetection::from_detection).collect();

    let mut sessions = state.annotation_sessions.write().await;
    let session = sessions.open(current.user.guid, case.guid, upload.guid, seed);
    info!(session = %session.guid, upload = %upload.guid, "Annotation session opened");

    Ok(Json(SessionStateResponse::from_session(session)))
}

/// PUT /api/annotation/:session_id
pub async fn replace_draft(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<ReplaceDraftRequest>,
) -> ApiResult<Json<SessionStateResponse>> {
    let mut sessions = state.annotation_sessions.write().await;
    let session = sessions
        .get_mut(session_id, current.user.guid)
        .ok_or_else(|| session_not_found(session_id))?;

    session.replace_draft(payload.draft);
    Ok(Json(SessionStateResponse::from_session(session)))
}

/// POST /api/annotation/:session_id/undo
pub async fn undo(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionStateResponse>> {
    let mut sessions = state.annotation_sessions.write().await;
    let session = sessions
        .get_mut(session_id, current.user.guid)
        .ok_or_else(|| session_not_found(session_id))?;

    if !session.undo() {
        return Err(ApiError::Conflict("Nothing to undo".to_string()));
    }
    Ok(Json(SessionStateResponse::from_session(session)))
}

/// POST /api/annotation/:session_id/redo
pub async fn redo(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionStateResponse>> {
    let mut sessions = state.annotation_sessions.write().await;
    let session = sessions
        .get_mut(session_id, current.user.guid)
        .ok_or_else(|| session_not_found(session_id))?;

    if !session.redo() {
        return Err(ApiError::Conflict("Nothing to redo".to_string()));
    }
    Ok(Json(SessionStateResponse::from_session(session)))
}

/// POST /api/annotation/:session_id/commit
///
/// Reconciles the draft against the stored baseline in one transaction,
/// then closes the session. A failed commit leaves the session open so
/// the client can fix the draft and retry.
pub async fn commit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ReconcileOutcome>> {
    let (case_guid, upload_guid, draft) = {
        let sessions = state.annotation_sessions.read().await;
        let session = sessions
            .get(session_id, current.user.guid)
            .ok_or_else(|| session_not_found(session_id))?;
        (session.case_guid, session.upload_guid, session.draft.clone())
    };

    // Re-check ownership against the live rows; the case or upload may
    // have been deleted since the session opened
    let (case, upload) =
        load_owned_upload(&state, current.user.guid, case_guid, upload_guid).await?;

    let outcome = reconcile::commit_detections(&state.db, &case, upload.guid, &draft).await?;

    let mut sessions = state.annotation_sessions.write().await;
    sessions.remove(session_id, current.user.guid);
    drop(sessions);

    state.event_bus.emit(EntoEvent::DetectionsSaved {
        case_id: case.guid,
        upload_id: upload.guid,
        added: outcome.added,
        updated: outcome.updated,
        deleted: outcome.deleted,
        timestamp: Utc::now(),
    });
    if outcome.pmi_recomputed {
        if let Some(result) = &outcome.analysis {
            state.event_bus.emit(EntoEvent::PmiUpdated {
                case_id: case.guid,
                oldest_stage: result.oldest_stage,
                pmi_min_hours: result.pmi_min_hours,
                pmi_max_hours: result.pmi_max_hours,
                timestamp: Utc::now(),
            });
        }
    }

    info!(
        case = %case.guid,
        upload = %upload.guid,
        added = outcome.added,
        updated = outcome.updated,
        deleted = outcome.deleted,
        "Annotations committed"
    );
    Ok(Json(outcome))
}

/// DELETE /api/annotation/:session_id
pub async fn abandon(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<AbandonResponse>> {
    let mut sessions = state.annotation_sessions.write().await;
    sessions
        .remove(session_id, current.user.guid)
        .ok_or_else(|| session_not_found(session_id))?;

    info!(session = %session_id, "Annotation session abandoned");
    Ok(Json(AbandonResponse { success: true }))
}

/// Build annotation session routes
pub fn annotation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/cases/:case_id/uploads/:upload_id/annotation",
            post(open_session),
        )
        .route(
            "/api/annotation/:session_id",
            put(replace_draft).delete(abandon),
        )
        .route("/api/annotation/:session_id/undo", post(undo))
        .route("/api/annotation/:session_id/redo", post(redo))
        .route("/api/annotation/:session_id/commit", post(commit))
}
