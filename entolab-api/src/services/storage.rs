//! S3-compatible object storage access
//!
//! Specimen images and report exports live in a single bucket under
//! per-case prefixes. Browsers never stream bytes through this service:
//! uploads and downloads go straight to the store via presigned URLs.

use entolab_common::db::models::ExportFormat;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use entolab_common::config::StorageConfig;

/// Presigned URL lifetime
const PRESIGN_EXPIRY: Duration = Duration::from_secs(15 * 60);

/// Object storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Storage backend error: {0}")]
    Backend(#[from] object_store::Error),
}

/// Object storage handle for the case bucket.
///
/// Presigned URLs are always computed against the configured S3 bucket;
/// direct reads, writes, and deletes go through `store`, which normally
/// is that same bucket but can be swapped for another backend.
pub struct ObjectStorage {
    signer: Arc<AmazonS3>,
    store: Arc<dyn ObjectStore>,
}

impl ObjectStorage {
    /// Build the S3 client from resolved configuration
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let s3 = Arc::new(Self::build_s3(config)?);
        Ok(Self {
            signer: s3.clone(),
            store: s3,
        })
    }

    /// Same presigning setup, but reads and writes routed to `store`.
    ///
    /// Lets tests exercise the export and delete paths against
    /// `object_store::memory::InMemory` without a live bucket.
    pub fn with_store(
        config: &StorageConfig,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            signer: Arc::new(Self::build_s3(config)?),
            store,
        })
    }

    fn build_s3(config: &StorageConfig) -> Result<AmazonS3, StorageError> {
        let bucket = config
            .bucket
            .as_deref()
            .ok_or_else(|| StorageError::Config("storage.bucket not configured".to_string()))?;

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        Ok(builder.build()?)
    }

    /// Object key for an uploaded specimen image
    pub fn upload_key(case_id: Uuid, upload_id: Uuid, filename: &str) -> String {
        format!(
            "cases/{}/uploads/{}/{}",
            case_id,
            upload_id,
            sanitize_filename(filename)
        )
    }

    /// Object key for a case report export
    pub fn export_key(case_id: Uuid, export_id: Uuid, format: ExportFormat) -> String {
        format!(
            "cases/{}/exports/{}.{}",
            case_id,
            export_id,
            format.as_str()
        )
    }

    /// Presigned PUT URL the client uploads the image bytes to
    pub async fn presign_put(&self, key: &str) -> Result<String, StorageError> {
        let path = ObjectPath::from(key);
        let url = self
            .signer
            .signed_url(Method::PUT, &path, PRESIGN_EXPIRY)
            .await?;
        Ok(url.to_string())
    }

    /// Presigned GET URL for downloading an object
    pub async fn presign_get(&self, key: &str) -> Result<String, StorageError> {
        let path = ObjectPath::from(key);
        let url = self
            .signer
            .signed_url(Method::GET, &path, PRESIGN_EXPIRY)
            .await?;
        Ok(url.to_string())
    }

    /// Write report bytes directly from the service
    pub async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = ObjectPath::from(key);
        self.store.put(&path, PutPayload::from(bytes)).await?;
        Ok(())
    }

    /// Delete an object. Callers treat failures as best-effort.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = ObjectPath::from(key);
        self.store.delete(&path).await?;
        Ok(())
    }
}

/// Strip path separators and control characters from a client filename
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\') {
                '_'
            } else {
                c
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "upload.bin".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_key_layout() {
        let case_id = Uuid::new_v4();
        let upload_id = Uuid::new_v4();
        let key = ObjectStorage::upload_key(case_id, upload_id, "larva_01.jpg");
        assert_eq!(
            key,
            format!("cases/{}/uploads/{}/larva_01.jpg", case_id, upload_id)
        );
    }

    #[test]
    fn test_filename_sanitized() {
        let case_id = Uuid::new_v4();
        let upload_id = Uuid::new_v4();
        let key = ObjectStorage::upload_key(case_id, upload_id, "../../etc/passwd");
        // The filename segment may not introduce extra path separators
        assert_eq!(key.matches('/').count(), 4, "path traversal not neutralized: {}", key);
        assert!(key.starts_with(&format!("cases/{}/uploads/{}/", case_id, upload_id)));
    }

    #[test]
    fn test_empty_filename_gets_placeholder() {
        assert_eq!(sanitize_filename(""), "upload.bin");
        assert_eq!(sanitize_filename(".."), "upload.bin");
    }

    #[test]
    fn test_export_key_extension_matches_format() {
        let case_id = Uuid::new_v4();
        let export_id = Uuid::new_v4();
        let key = ObjectStorage::export_key(case_id, export_id, ExportFormat::Csv);
        assert!(key.ends_with(".csv"));
    }
}
