//! Session extraction for protected routes
//!
//! `CurrentUser` pulls the session token from the `Authorization: Bearer`
//! header or the `entolab_session` cookie, validates the session, and loads
//! the account. Handlers take it as an argument; unauthenticated requests
//! are rejected with 401 before the handler body runs.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use entolab_common::db::models::User;

use super::service;
use crate::db;
use crate::{ApiError, AppState};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "entolab_session";

/// The authenticated user for the current request
pub struct CurrentUser {
    pub user: User,
    /// Digest of the presented token, for logout
    pub token_hash: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;

        let token_hash = service::digest(&token);
        let user_guid = db::sessions::find_valid_session(&state.db, &token_hash)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))?;

        let user = db::users::get_user(&state.db, user_guid)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(CurrentUser { user, token_hash })
    }
}

/// Bearer header first, session cookie second
fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    let cookies = parts.headers.get(COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let pair = pair.trim();
        if let Some(value) = pair.strip_prefix(&format!("{}=", SESSION_COOKIE)) {
            return Some(value.to_string());
        }
    }
    None
}
