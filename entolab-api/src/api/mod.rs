//! HTTP API handlers

pub mod annotations;
pub mod cases;
pub mod detections;
pub mod exports;
pub mod health;
pub mod sse;
pub mod uploads;

pub use annotations::annotation_routes;
pub use cases::case_routes;
pub use detections::detection_routes;
pub use exports::export_routes;
pub use health::health_routes;
pub use sse::event_stream;
pub use uploads::upload_routes;

use entolab_common::db::models::{Case, Upload};
use uuid::Uuid;

use crate::{ApiError, ApiResult, AppState};

/// Load a case the current user owns.
///
/// Missing, soft-deleted, and foreign cases all come back 404 so the API
/// does not leak which case ids exist.
pub(crate) async fn load_owned_case(
    state: &AppState,
    user_guid: Uuid,
    case_guid: Uuid,
) -> ApiResult<Case> {
    let case = crate::db::cases::get_case(&state.db, case_guid).await?;
    case.filter(|c| c.user_guid == user_guid)
        .ok_or_else(|| ApiError::NotFound(format!("Case not found: {}", case_guid)))
}

/// Load an upload under a case the current user owns
pub(crate) async fn load_owned_upload(
    state: &AppState,
    user_guid: Uuid,
    case_guid: Uuid,
    upload_guid: Uuid,
) -> ApiResult<(Case, Upload)> {
    let case = load_owned_case(state, user_guid, case_guid).await?;
    let upload = crate::db::uploads::get_upload(&state.db, upload_guid).await?;
    let upload = upload
        .filter(|u| u.case_guid == case.guid)
        .ok_or_else(|| ApiError::NotFound(format!("Upload not found: {}", upload_guid)))?;
    Ok((case, upload))
}
