//! Authentication endpoints
//!
//! POST /api/auth/register, /login, /logout, /recover

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::extract::{CurrentUser, SESSION_COOKIE};
use super::service;
use crate::db;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_guid: Uuid,
    pub username: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    /// Shown exactly once; only digests are stored
    pub recovery_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_guid: Uuid,
    pub username: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RecoverRequest {
    pub username: String,
    pub recovery_code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct RecoverResponse {
    pub user_guid: Uuid,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub remaining_recovery_codes: i64,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

fn session_cookie(token: &str, expires_at: DateTime<Utc>) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Expires={}",
        SESSION_COOKIE,
        token,
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
    )
}

fn validate_credentials(username: &str, password: &str) -> ApiResult<()> {
    if username.trim().len() < 3 || username.len() > 64 {
        return Err(ApiError::BadRequest(
            "Username must be between 3 and 64 characters".to_string(),
        ));
    }
    if password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    validate_credentials(&payload.username, &payload.password)?;
    let username = payload.username.trim();

    if db::users::get_user_by_username(&state.db, username)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("Username already taken".to_string()));
    }

    let salt = service::generate_salt();
    let hash = service::hash_password(&payload.password, &salt);
    let user = db::users::create_user(&state.db, username, &hash, &salt).await?;

    let recovery_codes = service::generate_recovery_codes(service::RECOVERY_CODE_COUNT);
    let code_hashes: Vec<String> = recovery_codes
        .iter()
        .map(|c| service::digest(&service::normalize_recovery_code(c)))
        .collect();
    db::users::store_recovery_codes(&state.db, user.guid, &code_hashes).await?;

    let session = service::issue_session(&state.db, user.guid).await?;
    info!(username = %user.username, "User registered");

    let cookie = session_cookie(&session.token, session.expires_at);
    Ok((
        [(SET_COOKIE, cookie)],
        Json(RegisterResponse {
            user_guid: user.guid,
            username: user.username,
            session_token: session.token,
            expires_at: session.expires_at,
            recovery_codes,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !state.login_limiter.check(&payload.username) {
        warn!(username = %payload.username, "Login attempts throttled");
        return Err(ApiError::RateLimited(
            "Too many attempts; try again later".to_string(),
        ));
    }

    let user = db::users::get_user_by_username(&state.db, &payload.username).await?;

    // Same generic message for unknown user and wrong password
    let user = user.filter(|u| {
        service::verify_password(&payload.password, &u.password_salt, &u.password_hash)
    });
    let Some(user) = user else {
        return Err(ApiError::Unauthorized(
            "Invalid username or password".to_string(),
        ));
    };

    let session = service::issue_session(&state.db, user.guid).await?;
    info!(username = %user.username, "User logged in");

    let cookie = session_cookie(&session.token, session.expires_at);
    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginResponse {
            user_guid: user.guid,
            username: user.username,
            session_token: session.token,
            expires_at: session.expires_at,
        }),
    ))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<LogoutResponse>> {
    db::sessions::delete_session(&state.db, &current.token_hash).await?;
    Ok(Json(LogoutResponse { success: true }))
}

/// POST /api/auth/recover
///
/// Consumes a one-time recovery code, resets the password, revokes all
/// existing sessions, and issues a fresh one.
pub async fn recover(
    State(state): State<AppState>,
    Json(payload): Json<RecoverRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !state.login_limiter.check(&payload.username) {
        warn!(username = %payload.username, "Recovery attempts throttled");
        return Err(ApiError::RateLimited(
            "Too many attempts; try again later".to_string(),
        ));
    }
    if payload.new_password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    // The code must exist, be unspent, and belong to the named account.
    // Same generic error for all failure shapes.
    let user = db::users::get_user_by_username(&state.db, &payload.username).await?;
    let Some(user) = user else {
        return Err(ApiError::Unauthorized("Invalid recovery code".to_string()));
    };

    let code_hash = service::digest(&service::normalize_recovery_code(&payload.recovery_code));
    if !db::users::consume_recovery_code(&state.db, user.guid, &code_hash).await? {
        return Err(ApiError::Unauthorized("Invalid recovery code".to_string()));
    }

    let salt = service::generate_salt();
    let hash = service::hash_password(&payload.new_password, &salt);
    db::users::update_password(&state.db, user.guid, &hash, &salt).await?;
    db::sessions::delete_sessions_for_user(&state.db, user.guid).await?;

    let session = service::issue_session(&state.db, user.guid).await?;
    let remaining = db::users::remaining_recovery_codes(&state.db, user.guid).await?;
    info!(username = %user.username, remaining, "Account recovered via one-time code");

    let cookie = session_cookie(&session.token, session.expires_at);
    Ok((
        [(SET_COOKIE, cookie)],
        Json(RecoverResponse {
            user_guid: user.guid,
            session_token: session.token,
            expires_at: session.expires_at,
            remaining_recovery_codes: remaining,
        }),
    ))
}

/// Build authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/recover", post(recover))
}
