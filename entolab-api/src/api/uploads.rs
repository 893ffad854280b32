//! Specimen image upload endpoints
//!
//! Image bytes never pass through this service. Creating an upload
//! registers the metadata and returns a presigned PUT URL the client
//! writes to directly; a completion call confirms the object landed.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use entolab_common::db::models::Upload;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::load_owned_upload;
use crate::auth::CurrentUser;
use crate::db;
use crate::services::storage::{sanitize_filename, ObjectStorage};
use crate::{ApiError, ApiResult, AppState};

/// Accepted specimen image content types
const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Largest accepted image (32 MiB)
const MAX_UPLOAD_BYTES: i64 = 32 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct CreateUploadRequest {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Serialize)]
pub struct CreateUploadResponse {
    #[serde(flatten)]
    pub upload: Upload,
    /// Presigned PUT URL, valid for 15 minutes
    pub upload_url: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadUrlResponse {
    pub upload_id: Uuid,
    /// Presigned GET URL, valid for 15 minutes
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// POST /api/cases/:case_id/uploads
pub async fn create_upload(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<CreateUploadRequest>,
) -> ApiResult<Json<CreateUploadResponse>> {
    let case = super::load_owned_case(&state, current.user.guid, case_id).await?;

    if !ALLOWED_CONTENT_TYPES.contains(&payload.content_type.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported content type: {} (accepted: image/jpeg, image/png)",
            payload.content_type
        )));
    }
    if payload.size_bytes <= 0 || payload.size_bytes > MAX_UPLOAD_BYTES {
        return Err(ApiError::BadRequest(format!(
            "Image size must be between 1 and {} bytes",
            MAX_UPLOAD_BYTES
        )));
    }

    let upload_guid = Uuid::new_v4();
    let filename = sanitize_filename(&payload.filename);
    let object_key = ObjectStorage::upload_key(case.guid, upload_guid, &filename);

    let upload_url = state
        .storage
        .presign_put(&object_key)
        .await
        .map_err(|e| ApiError::Internal(format!("Presigning failed: {}", e)))?;

    let upload = db::uploads::create_upload(
        &state.db,
        upload_guid,
        case.guid,
        &filename,
        &payload.content_type,
        payload.size_bytes,
        &object_key,
    )
    .await?;

    info!(case = %case.guid, upload = %upload.guid, "Upload registered");
    Ok(Json(CreateUploadResponse { upload, upload_url }))
}

/// POST /api/cases/:case_id/uploads/:upload_id/complete
pub async fn complete_upload(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((case_id, upload_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Upload>> {
    let (_, upload) = load_owned_upload(&state, current.user.guid, case_id, upload_id).await?;

    db::uploads::mark_stored(&state.db, upload.guid).await?;
    let upload = db::uploads::get_upload(&state.db, upload.guid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Upload not found: {}", upload_id)))?;

    Ok(Json(upload))
}

/// GET /api/cases/:case_id/uploads
pub async fn list_uploads(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(case_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Upload>>> {
    let case = super::load_owned_case(&state, current.user.guid, case_id).await?;
    let uploads = db::uploads::list_uploads(&state.db, case.guid).await?;
    Ok(Json(uploads))
}

/// GET /api/cases/:case_id/uploads/:upload_id/url
pub async fn download_url(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((case_id, upload_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<DownloadUrlResponse>> {
    let (_, upload) = load_owned_upload(&state, current.user.guid, case_id, upload_id).await?;

    if !upload.stored {
        return Err(ApiError::Conflict(
            "Upload has not been completed yet".to_string(),
        ));
    }

    let download_url = state
        .storage
        .presign_get(&upload.object_key)
        .await
        .map_err(|e| ApiError::Internal(format!("Presigning failed: {}", e)))?;

    Ok(Json(DownloadUrlResponse {
        upload_id: upload.guid,
        download_url,
    }))
}

/// DELETE /api/cases/:case_id/uploads/:upload_id
///
/// Soft-deletes the row; object removal is best effort since the record
/// is already gone from the API's point of view.
pub async fn delete_upload(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((case_id, upload_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<DeleteResponse>> {
    let (_, upload) = load_owned_upload(&state, current.user.guid, case_id, upload_id).await?;

    db::uploads::soft_delete_upload(&state.db, upload.guid).await?;

    if upload.stored {
        if let Err(e) = state.storage.delete(&upload.object_key).await {
            warn!(upload = %upload.guid, "Object delete failed: {}", e);
        }
    }

    info!(upload = %upload.guid, "Upload deleted");
    Ok(Json(DeleteResponse { success: true }))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/cases/:case_id/uploads",
            get(list_uploads).post(create_upload),
        )
        .route(
            "/api/cases/:case_id/uploads/:upload_id/complete",
            post(complete_upload),
        )
        .route(
            "/api/cases/:case_id/uploads/:upload_id/url",
            get(download_url),
        )
        .route(
            "/api/cases/:case_id/uploads/:upload_id",
            axum::routing::delete(delete_upload),
        )
}
