//! Domain models backing the database rows
//!
//! Row mapping is done by hand in the service crate's repository modules;
//! these are the typed structs those modules produce and the API serializes.

use crate::pmi::LifeStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registered user account
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub guid: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_salt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Discovery site location. All three fields are present together or the
/// case has no location at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Forensic case grouping uploads, detections, and the PMI estimate
#[derive(Debug, Clone, Serialize)]
pub struct Case {
    pub guid: Uuid,
    pub user_guid: Uuid,
    pub title: String,
    pub description: String,
    /// Scene ambient temperature in °C, used by the thermal-summation model
    pub ambient_temp_c: f64,
    /// When the remains were discovered
    pub discovered_at: DateTime<Utc>,
    pub location: Option<CaseLocation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Uploaded specimen image
#[derive(Debug, Clone, Serialize)]
pub struct Upload {
    pub guid: Uuid,
    pub case_guid: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    /// Object storage key under the case prefix
    pub object_key: String,
    /// Whether the client confirmed the object was stored
    pub stored: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Origin of a detection row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Produced by the external image-analysis model
    Model,
    /// Drawn by a human annotator
    Human,
}

impl DetectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::Model => "model",
            DetectionSource::Human => "human",
        }
    }

    pub fn parse(s: &str) -> Option<DetectionSource> {
        match s {
            "model" => Some(DetectionSource::Model),
            "human" => Some(DetectionSource::Human),
            _ => None,
        }
    }
}

/// Life-stage bounding box on an upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub guid: Uuid,
    pub upload_guid: Uuid,
    /// Bounding box in normalized image coordinates [0, 1]
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub life_stage: LifeStage,
    /// Species label as returned by the model or annotator; may be a value
    /// outside the built-in development table
    pub species: Option<String>,
    /// Model confidence; absent for human-drawn boxes
    pub confidence: Option<f64>,
    pub source: DetectionSource,
    /// Set once a human has modified a model detection
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Detection {
    /// Whether two detections describe the same annotation content
    /// (geometry and labels; bookkeeping fields ignored)
    pub fn same_content(&self, other: &Detection) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
            && self.life_stage == other.life_stage
            && self.species == other.species
    }
}

/// Current PMI estimate for a case
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub case_guid: Uuid,
    pub oldest_stage: LifeStage,
    pub species: Option<String>,
    pub pmi_min_hours: f64,
    pub pmi_max_hours: Option<f64>,
    pub ambient_temp_c: f64,
    pub computed_at: DateTime<Utc>,
}

/// Case report export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn parse(s: &str) -> Option<ExportFormat> {
        match s {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    /// Content type of the exported object
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }
}

/// Case report export record
#[derive(Debug, Clone, Serialize)]
pub struct ExportRecord {
    pub guid: Uuid,
    pub case_guid: Uuid,
    pub format: ExportFormat,
    pub object_key: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}
