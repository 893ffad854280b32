//! Case report generation
//!
//! Assembles a full case snapshot (metadata, uploads, detections, current
//! PMI estimate), renders it as JSON or CSV, writes the artifact to object
//! storage, and records it in the exports table.

use entolab_common::db::models::{
    AnalysisResult, Case, Detection, ExportFormat, ExportRecord, Upload,
};
use entolab_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::storage::ObjectStorage;
use crate::db;

/// Snapshot of one case for export
#[derive(Debug, Serialize)]
pub struct CaseReport {
    pub case: Case,
    pub uploads: Vec<UploadReport>,
    pub analysis: Option<AnalysisResult>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct UploadReport {
    #[serde(flatten)]
    pub upload: Upload,
    pub detections: Vec<Detection>,
}

/// Collect everything the report needs from the database
pub async fn build_report(pool: &SqlitePool, case: Case) -> Result<CaseReport> {
    let uploads = db::uploads::list_uploads(pool, case.guid).await?;
    let analysis = db::analyses::get_result(pool, case.guid).await?;

    let mut upload_reports = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let detections = db::detections::list_for_upload(pool, upload.guid).await?;
        upload_reports.push(UploadReport { upload, detections });
    }

    Ok(CaseReport {
        case,
        uploads: upload_reports,
        analysis,
        generated_at: chrono::Utc::now(),
    })
}

/// Render the report in the requested format
pub fn render_report(report: &CaseReport, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => serde_json::to_vec_pretty(report)
            .map_err(|e| entolab_common::Error::Internal(format!("Report serialization: {}", e))),
        ExportFormat::Csv => Ok(render_csv(report).into_bytes()),
    }
}

/// One detection per row, case-level columns repeated. Empty trailer row
/// set when a case has no detections yet.
fn render_csv(report: &CaseReport) -> String {
    let mut out = String::new();
    out.push_str(
        "case_id,case_title,ambient_temp_c,discovered_at,oldest_stage,\
         pmi_min_hours,pmi_max_hours,upload_id,filename,detection_id,\
         x,y,width,height,life_stage,species,confidence,source,edited\n",
    );

    let (oldest, pmi_min, pmi_max) = match &report.analysis {
        Some(a) => (
            a.oldest_stage.as_str().to_string(),
            format!("{:.1}", a.pmi_min_hours),
            a.pmi_max_hours.map(|h| format!("{:.1}", h)).unwrap_or_default(),
        ),
        None => (String::new(), String::new(), String::new()),
    };

    let case_prefix = format!(
        "{},{},{:.1},{},{},{},{}",
        report.case.guid,
        csv_field(&report.case.title),
        report.case.ambient_temp_c,
        report.case.discovered_at.to_rfc3339(),
        oldest,
        pmi_min,
        pmi_max,
    );

    let mut wrote_row = false;
    for upload in &report.uploads {
        for d in &upload.detections {
            wrote_row = true;
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                case_prefix,
                upload.upload.guid,
                csv_field(&upload.upload.filename),
                d.guid,
                d.x,
                d.y,
                d.width,
                d.height,
                d.life_stage.as_str(),
                csv_field(d.species.as_deref().unwrap_or("")),
                d.confidence.map(|c| format!("{:.3}", c)).unwrap_or_default(),
                d.source.as_str(),
                if d.edited { "1" } else { "0" },
            ));
        }
    }
    if !wrote_row {
        out.push_str(&format!("{},,,,,,,,,,,,\n", case_prefix));
    }

    out
}

/// Quote a field when it contains a delimiter, quote, or newline
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Build, render, store, and record an export for a case
pub async fn generate_export(
    pool: &SqlitePool,
    storage: &ObjectStorage,
    case: Case,
    format: ExportFormat,
) -> Result<ExportRecord> {
    let case_guid = case.guid;
    let report = build_report(pool, case).await?;
    let bytes = render_report(&report, format)?;

    let export_guid = Uuid::new_v4();
    let key = ObjectStorage::export_key(case_guid, export_guid, format);
    storage
        .put_bytes(&key, bytes.clone())
        .await
        .map_err(|e| entolab_common::Error::Internal(format!("Export upload failed: {}", e)))?;

    db::exports::create_export(pool, export_guid, case_guid, format, &key, bytes.len() as i64)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use entolab_common::db::models::{CaseLocation, DetectionSource};
    use entolab_common::pmi::LifeStage;

    fn sample_report() -> CaseReport {
        let now = Utc::now();
        let case_guid = Uuid::new_v4();
        let upload_guid = Uuid::new_v4();
        CaseReport {
            case: Case {
                guid: case_guid,
                user_guid: Uuid::new_v4(),
                title: "Roadside, mile 14".to_string(),
                description: String::new(),
                ambient_temp_c: 22.5,
                discovered_at: now,
                location: Some(CaseLocation {
                    name: "Route 9".to_string(),
                    latitude: 44.2,
                    longitude: -71.5,
                }),
                created_at: now,
                updated_at: now,
            },
            uploads: vec![UploadReport {
                upload: Upload {
                    guid: upload_guid,
                    case_guid,
                    filename: "site, north.jpg".to_string(),
                    content_type: "image/jpeg".to_string(),
                    size_bytes: 1024,
                    object_key: "cases/x/uploads/y/site.jpg".to_string(),
                    stored: true,
                    created_at: now,
                    updated_at: now,
                },
                detections: vec![Detection {
                    guid: Uuid::new_v4(),
                    upload_guid,
                    x: 0.1,
                    y: 0.2,
                    width: 0.05,
                    height: 0.04,
                    life_stage: LifeStage::Instar3,
                    species: Some("lucilia_sericata".to_string()),
                    confidence: Some(0.87),
                    source: DetectionSource::Model,
                    edited: false,
                    created_at: now,
                    updated_at: now,
                }],
            }],
            analysis: None,
            generated_at: now,
        }
    }

    #[test]
    fn test_csv_has_header_and_row() {
        let csv = render_csv(&sample_report());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("case_id,case_title"));
        assert!(lines[1].contains("instar_3"));
        assert!(lines[1].contains("lucilia_sericata"));
    }

    #[test]
    fn test_csv_quotes_embedded_commas() {
        let csv = render_csv(&sample_report());
        assert!(csv.contains("\"Roadside, mile 14\""));
        assert!(csv.contains("\"site, north.jpg\""));
    }

    #[test]
    fn test_csv_empty_case_gets_trailer_row() {
        let mut report = sample_report();
        report.uploads.clear();
        let csv = render_csv(&report);
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn test_json_renders() {
        let bytes = render_report(&sample_report(), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["case"]["title"], "Roadside, mile 14");
        assert_eq!(value["uploads"][0]["detections"][0]["life_stage"], "instar_3");
    }
}
