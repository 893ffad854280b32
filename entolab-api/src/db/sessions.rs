//! Session database operations
//!
//! Sessions are keyed by the SHA-256 digest of the bearer token; the token
//! itself never touches the database.

use chrono::{DateTime, Utc};
use entolab_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

/// Persist a new session
pub async fn create_session(
    pool: &SqlitePool,
    token_hash: &str,
    user_guid: Uuid,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO sessions (token_hash, user_guid, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(token_hash)
    .bind(user_guid.to_string())
    .bind(Utc::now().to_rfc3339())
    .bind(expires_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up a live session by token digest.
///
/// Expired rows are deleted lazily on lookup.
pub async fn find_valid_session(pool: &SqlitePool, token_hash: &str) -> Result<Option<Uuid>> {
    let now = Utc::now().to_rfc3339();

    let row = sqlx::query("SELECT user_guid, expires_at FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let expires_at: String = row.get("expires_at");
    if expires_at <= now {
        // RFC 3339 UTC strings compare chronologically; the row is stale
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(pool)
            .await?;
        return Ok(None);
    }

    let user_guid: String = row.get("user_guid");
    Ok(Some(parse_uuid(&user_guid, "sessions.user_guid")?))
}

/// Delete a session (logout)
pub async fn delete_session(pool: &SqlitePool, token_hash: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;

    Ok(())
}

/// Delete all sessions for a user (password reset via recovery code)
pub async fn delete_sessions_for_user(pool: &SqlitePool, user_guid: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE user_guid = ?")
        .bind(user_guid.to_string())
        .execute(pool)
        .await?;

    Ok(())
}
