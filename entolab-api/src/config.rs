//! Configuration resolution for entolab-api
//!
//! Service settings come from the shared TOML config with `ENTOLAB_*`
//! environment overrides; the detector API key additionally resolves from
//! the database settings table (Database → ENV → TOML priority).

use entolab_common::config::{StorageConfig, TomlConfig};
use entolab_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Default bind address for the API service
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5810";

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_address: String,
    /// Base URL of the external image-analysis service
    pub detector_url: String,
    pub storage: StorageConfig,
}

impl ServiceConfig {
    /// Resolve from TOML with environment overrides (ENV → TOML → default)
    pub fn resolve(toml: &TomlConfig) -> Result<ServiceConfig> {
        let bind_address = std::env::var("ENTOLAB_BIND")
            .ok()
            .or_else(|| toml.bind_address.clone())
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let detector_url = std::env::var("ENTOLAB_DETECTOR_URL")
            .ok()
            .or_else(|| toml.detector_url.clone())
            .ok_or_else(|| {
                Error::Config(
                    "Detection service URL not configured. Set ENTOLAB_DETECTOR_URL or \
                     detector_url in the TOML config."
                        .to_string(),
                )
            })?;

        let mut storage = toml.storage.clone();
        if let Ok(v) = std::env::var("ENTOLAB_STORAGE_BUCKET") {
            storage.bucket = Some(v);
        }
        if let Ok(v) = std::env::var("ENTOLAB_STORAGE_REGION") {
            storage.region = Some(v);
        }
        if let Ok(v) = std::env::var("ENTOLAB_STORAGE_ENDPOINT") {
            storage.endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("ENTOLAB_STORAGE_ACCESS_KEY_ID") {
            storage.access_key_id = Some(v);
        }
        if let Ok(v) = std::env::var("ENTOLAB_STORAGE_SECRET_ACCESS_KEY") {
            storage.secret_access_key = Some(v);
        }
        if let Ok(v) = std::env::var("ENTOLAB_STORAGE_ALLOW_HTTP") {
            storage.allow_http = v == "1" || v.eq_ignore_ascii_case("true");
        }

        Ok(ServiceConfig {
            bind_address,
            detector_url,
            storage,
        })
    }
}

/// Resolve the detector API key from 3-tier configuration.
///
/// Priority: Database → ENV → TOML. Warns when more than one source holds a
/// valid key. Returns `None` when no tier has one; the detection service may
/// run unauthenticated in dev.
pub async fn resolve_detector_api_key(
    db: &SqlitePool,
    toml: &TomlConfig,
) -> Result<Option<String>> {
    let db_key: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'detector_api_key'")
            .fetch_optional(db)
            .await?;

    let env_key = std::env::var("ENTOLAB_DETECTOR_API_KEY").ok();
    let toml_key = toml.detector_api_key.clone();

    let mut sources = Vec::new();
    if db_key.as_deref().is_some_and(is_valid_key) {
        sources.push("database");
    }
    if env_key.as_deref().is_some_and(is_valid_key) {
        sources.push("environment");
    }
    if toml_key.as_deref().is_some_and(is_valid_key) {
        sources.push("TOML");
    }

    if sources.len() > 1 {
        warn!(
            "Detector API key found in multiple sources: {}. Using database (highest priority).",
            sources.join(", ")
        );
    }

    for (key, source) in [
        (db_key, "database"),
        (env_key, "environment variable"),
        (toml_key, "TOML config"),
    ] {
        if let Some(key) = key {
            if is_valid_key(&key) {
                info!("Detector API key loaded from {}", source);
                return Ok(Some(key));
            }
        }
    }

    Ok(None)
}

/// Validate a key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }
}
