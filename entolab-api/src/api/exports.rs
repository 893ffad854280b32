//! Case report export endpoints

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use entolab_common::db::models::{ExportFormat, ExportRecord};
use entolab_common::events::EntoEvent;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::load_owned_case;
use crate::auth::CurrentUser;
use crate::db;
use crate::services::report;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateExportRequest {
    /// "json" or "csv"
    pub format: String,
}

#[derive(Debug, Serialize)]
pub struct ExportUrlResponse {
    pub export_id: Uuid,
    pub content_type: &'static str,
    /// Presigned GET URL, valid for 15 minutes
    pub download_url: String,
}

/// POST /api/cases/:case_id/exports
pub async fn create_export(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<CreateExportRequest>,
) -> ApiResult<Json<ExportRecord>> {
    let case = load_owned_case(&state, current.user.guid, case_id).await?;

    let format = ExportFormat::parse(&payload.format).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Unsupported export format: {} (accepted: json, csv)",
            payload.format
        ))
    })?;

    let record = report::generate_export(&state.db, &state.storage, case, format).await?;

    state.event_bus.emit(EntoEvent::ExportCompleted {
        case_id: record.case_guid,
        export_id: record.guid,
        format: format.as_str().to_string(),
        timestamp: Utc::now(),
    });

    info!(export = %record.guid, format = format.as_str(), "Export generated");
    Ok(Json(record))
}

/// GET /api/cases/:case_id/exports
pub async fn list_exports(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(case_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ExportRecord>>> {
    let case = load_owned_case(&state, current.user.guid, case_id).await?;
    let exports = db::exports::list_exports(&state.db, case.guid).await?;
    Ok(Json(exports))
}

/// GET /api/cases/:case_id/exports/:export_id/url
pub async fn export_url(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((case_id, export_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ExportUrlResponse>> {
    let case = load_owned_case(&state, current.user.guid, case_id).await?;

    let export = db::exports::get_export(&state.db, export_id).await?;
    let export = export
        .filter(|e| e.case_guid == case.guid)
        .ok_or_else(|| ApiError::NotFound(format!("Export not found: {}", export_id)))?;

    let download_url = state
        .storage
        .presign_get(&export.object_key)
        .await
        .map_err(|e| ApiError::Internal(format!("Presigning failed: {}", e)))?;

    Ok(Json(ExportUrlResponse {
        export_id: export.guid,
        content_type: export.format.content_type(),
        download_url,
    }))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// DELETE /api/cases/:case_id/exports/:export_id
///
/// Soft-deletes the record; the stored artifact is removed best effort.
pub async fn delete_export(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((case_id, export_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<DeleteResponse>> {
    let case = load_owned_case(&state, current.user.guid, case_id).await?;

    let export = db::exports::get_export(&state.db, export_id).await?;
    let export = export
        .filter(|e| e.case_guid == case.guid)
        .ok_or_else(|| ApiError::NotFound(format!("Export not found: {}", export_id)))?;

    db::exports::soft_delete_export(&state.db, export.guid).await?;
    if let Err(e) = state.storage.delete(&export.object_key).await {
        tracing::warn!(export = %export.guid, "Object delete failed: {}", e);
    }

    info!(export = %export.guid, "Export deleted");
    Ok(Json(DeleteResponse { success: true }))
}

/// Build export routes
pub fn export_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/cases/:case_id/exports",
            get(list_exports).post(create_export),
        )
        .route(
            "/api/cases/:case_id/exports/:export_id",
            axum::routing::delete(delete_export),
        )
        .route("/api/cases/:case_id/exports/:export_id/url", get(export_url))
}
