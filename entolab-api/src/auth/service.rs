//! Core authentication primitives
//!
//! Pure functions (hashing, token and code generation) plus the session
//! issuance flow. Handlers stay thin; everything testable lives here.

use chrono::{DateTime, Duration, Utc};
use entolab_common::Result;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;

/// Session lifetime
pub const SESSION_TTL_DAYS: i64 = 30;

/// Number of one-time recovery codes issued at registration
pub const RECOVERY_CODE_COUNT: usize = 8;

/// Recovery code alphabet: no 0/O or 1/I lookalikes
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a random 16-byte password salt, hex encoded
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Salted password digest: SHA-256 over `salt || password`, hex encoded
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-work password check
pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    hash_password(password, salt) == expected_hash
}

/// Generate a random 256-bit session token, hex encoded
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 digest of a token or recovery code, hex encoded.
///
/// Only digests are persisted; the database never holds usable credentials.
pub fn digest(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate one-time recovery codes in `XXXX-XXXX` form
pub fn generate_recovery_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let chars: Vec<char> = (0..8)
                .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect();
            format!(
                "{}-{}",
                chars[..4].iter().collect::<String>(),
                chars[4..].iter().collect::<String>()
            )
        })
        .collect()
}

/// Normalize a user-entered recovery code before hashing: uppercase, strip
/// the separator
pub fn normalize_recovery_code(code: &str) -> String {
    code.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Issued session: the raw token plus its expiry
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Create a session for a user and persist its digest
pub async fn issue_session(pool: &SqlitePool, user_guid: Uuid) -> Result<IssuedSession> {
    let token = generate_session_token();
    let expires_at = Utc::now() + Duration::days(SESSION_TTL_DAYS);

    db::sessions::create_session(pool, &digest(&token), user_guid, expires_at).await?;

    Ok(IssuedSession { token, expires_at })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_depends_on_salt() {
        let hash_a = hash_password("hunter22", "salt-a");
        let hash_b = hash_password("hunter22", "salt-b");
        assert_ne!(hash_a, hash_b);
        assert!(verify_password("hunter22", "salt-a", &hash_a));
        assert!(!verify_password("hunter23", "salt-a", &hash_a));
    }

    #[test]
    fn test_session_tokens_unique_and_hex() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_recovery_code_format() {
        let codes = generate_recovery_codes(RECOVERY_CODE_COUNT);
        assert_eq!(codes.len(), RECOVERY_CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), 9);
            assert_eq!(&code[4..5], "-");
            // No confusable characters
            assert!(!code.contains('0') && !code.contains('O'));
            assert!(!code.contains('1') && !code.contains('I'));
        }
    }

    #[test]
    fn test_recovery_code_normalization() {
        assert_eq!(normalize_recovery_code(" abcd-ef23 "), "ABCDEF23");
        assert_eq!(
            digest(&normalize_recovery_code("ABCD-EF23")),
            digest(&normalize_recovery_code("abcdef23"))
        );
    }
}
