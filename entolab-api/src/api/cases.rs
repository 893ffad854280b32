//! Case management endpoints
//!
//! All routes require a valid session; cases are visible only to their
//! owner. A case carries either a complete location (name, latitude,
//! longitude) or none at all.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use entolab_common::db::models::{AnalysisResult, Case, CaseLocation, Upload};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::load_owned_case;
use crate::auth::CurrentUser;
use crate::db;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct LocationPayload {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct CasePayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub ambient_temp_c: f64,
    pub discovered_at: DateTime<Utc>,
    /// Either all three location fields or nothing
    pub location: Option<LocationPayload>,
}

#[derive(Debug, Serialize)]
pub struct CaseDetailResponse {
    #[serde(flatten)]
    pub case: Case,
    pub uploads: Vec<Upload>,
    pub analysis: Option<AnalysisResult>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

fn validate_case(payload: &CasePayload) -> ApiResult<Option<CaseLocation>> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title must not be empty".to_string()));
    }
    if !payload.ambient_temp_c.is_finite() || payload.ambient_temp_c < -60.0
        || payload.ambient_temp_c > 60.0
    {
        return Err(ApiError::BadRequest(
            "Ambient temperature must be between -60 and 60 °C".to_string(),
        ));
    }
    if payload.discovered_at > Utc::now() {
        return Err(ApiError::BadRequest(
            "Discovery time must not be in the future".to_string(),
        ));
    }

    match &payload.location {
        None => Ok(None),
        Some(loc) => {
            if loc.name.trim().is_empty() {
                return Err(ApiError::BadRequest(
                    "Location name must not be empty".to_string(),
                ));
            }
            if !(-90.0..=90.0).contains(&loc.latitude) {
                return Err(ApiError::BadRequest(
                    "Latitude must be between -90 and 90".to_string(),
                ));
            }
            if !(-180.0..=180.0).contains(&loc.longitude) {
                return Err(ApiError::BadRequest(
                    "Longitude must be between -180 and 180".to_string(),
                ));
            }
            Ok(Some(CaseLocation {
                name: loc.name.trim().to_string(),
                latitude: loc.latitude,
                longitude: loc.longitude,
            }))
        }
    }
}

/// POST /api/cases
pub async fn create_case(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CasePayload>,
) -> ApiResult<Json<Case>> {
    let location = validate_case(&payload)?;

    let case = db::cases::create_case(
        &state.db,
        current.user.guid,
        payload.title.trim(),
        &payload.description,
        payload.ambient_temp_c,
        payload.discovered_at,
        location.as_ref(),
    )
    .await?;

    info!(case = %case.guid, "Case created");
    Ok(Json(case))
}

/// GET /api/cases
pub async fn list_cases(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<Vec<Case>>> {
    let cases = db::cases::list_cases(&state.db, current.user.guid).await?;
    Ok(Json(cases))
}

/// GET /api/cases/:case_id
pub async fn get_case(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(case_id): Path<Uuid>,
) -> ApiResult<Json<CaseDetailResponse>> {
    let case = load_owned_case(&state, current.user.guid, case_id).await?;
    let uploads = db::uploads::list_uploads(&state.db, case.guid).await?;
    let analysis = db::analyses::get_result(&state.db, case.guid).await?;

    Ok(Json(CaseDetailResponse {
        case,
        uploads,
        analysis,
    }))
}

/// PUT /api/cases/:case_id
pub async fn update_case(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<CasePayload>,
) -> ApiResult<Json<Case>> {
    let case = load_owned_case(&state, current.user.guid, case_id).await?;
    let location = validate_case(&payload)?;

    db::cases::update_case(
        &state.db,
        case.guid,
        payload.title.trim(),
        &payload.description,
        payload.ambient_temp_c,
        payload.discovered_at,
        location.as_ref(),
    )
    .await?;

    let updated = load_owned_case(&state, current.user.guid, case_id).await?;
    Ok(Json(updated))
}

/// DELETE /api/cases/:case_id
pub async fn delete_case(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(case_id): Path<Uuid>,
) -> ApiResult<Json<DeleteResponse>> {
    let case = load_owned_case(&state, current.user.guid, case_id).await?;
    db::cases::soft_delete_case(&state.db, case.guid).await?;
    info!(case = %case.guid, "Case deleted");
    Ok(Json(DeleteResponse { success: true }))
}

/// Build case management routes
pub fn case_routes() -> Router<AppState> {
    Router::new()
        .route("/api/cases", get(list_cases).post(create_case))
        .route(
            "/api/cases/:case_id",
            get(get_case).put(update_case).delete(delete_case),
        )
}
