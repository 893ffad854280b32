//! Repository modules for entolab-api
//!
//! Hand-written sqlx queries over the shared schema. UUIDs travel as TEXT,
//! timestamps as RFC 3339 TEXT; each module maps rows into the typed models
//! from `entolab_common::db::models`.

pub mod analyses;
pub mod cases;
pub mod detections;
pub mod exports;
pub mod sessions;
pub mod uploads;
pub mod users;

use entolab_common::Result;
use uuid::Uuid;

/// Parse a TEXT uuid column
pub(crate) fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| entolab_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
