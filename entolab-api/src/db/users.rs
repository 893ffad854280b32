//! User account and recovery code database operations

use chrono::Utc;
use entolab_common::db::models::User;
use entolab_common::db::parse_timestamp;
use entolab_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let guid: String = row.get("guid");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(User {
        guid: parse_uuid(&guid, "users.guid")?,
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        password_salt: row.get("password_salt"),
        created_at: parse_timestamp(&created_at, "users.created_at")?,
        updated_at: parse_timestamp(&updated_at, "users.updated_at")?,
    })
}

/// Insert a new user. The caller has already hashed the password.
pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password_hash: &str,
    password_salt: &str,
) -> Result<User> {
    let guid = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (guid, username, password_hash, password_salt, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(username)
    .bind(password_hash)
    .bind(password_salt)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(User {
        guid,
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        password_salt: password_salt.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_user_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_user).transpose()
}

pub async fn get_user(pool: &SqlitePool, guid: Uuid) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE guid = ?")
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_user).transpose()
}

/// Replace a user's password hash and salt (account recovery)
pub async fn update_password(
    pool: &SqlitePool,
    guid: Uuid,
    password_hash: &str,
    password_salt: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE users SET password_hash = ?, password_salt = ?, updated_at = ? WHERE guid = ?",
    )
    .bind(password_hash)
    .bind(password_salt)
    .bind(Utc::now().to_rfc3339())
    .bind(guid.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Store freshly generated recovery code digests for a user
pub async fn store_recovery_codes(
    pool: &SqlitePool,
    user_guid: Uuid,
    code_hashes: &[String],
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    for hash in code_hashes {
        sqlx::query(
            "INSERT INTO recovery_codes (guid, user_guid, code_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_guid.to_string())
        .bind(hash)
        .bind(&now)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Consume an unspent recovery code belonging to a user.
///
/// Returns `true` when a matching unspent code was found. Marking
/// `consumed_at` in the same statement makes reuse impossible even under
/// concurrent attempts.
pub async fn consume_recovery_code(
    pool: &SqlitePool,
    user_guid: Uuid,
    code_hash: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE recovery_codes
        SET consumed_at = ?
        WHERE guid = (
            SELECT guid FROM recovery_codes
            WHERE user_guid = ? AND code_hash = ? AND consumed_at IS NULL
            LIMIT 1
        )
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(user_guid.to_string())
    .bind(code_hash)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Number of unspent recovery codes remaining for a user
pub async fn remaining_recovery_codes(pool: &SqlitePool, user_guid: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM recovery_codes WHERE user_guid = ? AND consumed_at IS NULL",
    )
    .bind(user_guid.to_string())
    .fetch_one(pool)
    .await?;

    Ok(count)
}
