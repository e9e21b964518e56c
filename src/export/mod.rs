use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::faces::ProcessedImage;

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
}

impl ReportFormat {
    /// Pick a format from the report file's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }
}

/// One written face crop
#[derive(Debug, Serialize)]
pub struct ReportedFace {
    pub index: usize,
    pub file: String,
    pub row: f32,
    pub col: f32,
    pub scale: f32,
    pub score: f32,
    pub members: usize,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Everything known about one run
#[derive(Debug, Serialize)]
pub struct DetectionReport {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub raw_detections: usize,
    pub clusters: usize,
    pub elapsed_ms: u128,
    pub generated_at: DateTime<Local>,
    pub faces: Vec<ReportedFace>,
}

impl DetectionReport {
    pub fn new(processed: &ProcessedImage) -> Self {
        let faces = processed
            .faces
            .iter()
            .map(|face| ReportedFace {
                index: face.index,
                file: face
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                row: face.detection.row,
                col: face.detection.col,
                scale: face.detection.scale,
                score: face.detection.score,
                members: face.detection.members,
                left: face.region.left,
                top: face.region.top,
                right: face.region.right,
                bottom: face.region.bottom,
            })
            .collect();

        Self {
            image: processed.image_path.to_string_lossy().to_string(),
            width: processed.width,
            height: processed.height,
            raw_detections: processed.raw_count,
            clusters: processed.cluster_count,
            elapsed_ms: processed.elapsed.as_millis(),
            generated_at: Local::now(),
            faces,
        }
    }
}

/// Write a report, choosing the format from the file extension.
pub fn export_report(report: &DetectionReport, output_path: &Path) -> Result<ReportFormat> {
    let format = match ReportFormat::from_path(output_path) {
        Some(format) => format,
        None => bail!(
            "Unsupported report format {:?} (use .json or .csv)",
            output_path
        ),
    };

    match format {
        ReportFormat::Json => export_json(report, output_path)?,
        ReportFormat::Csv => export_csv(report, output_path)?,
    }

    tracing::info!(path = ?output_path, faces = report.faces.len(), "Report written");
    Ok(format)
}

fn export_json(report: &DetectionReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(report: &DetectionReport, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    // Header row comes from the field names
    for face in &report.faces {
        wtr.serialize(face)?;
    }

    if report.faces.is_empty() {
        wtr.write_record([
            "index", "file", "row", "col", "scale", "score", "members", "left", "top", "right",
            "bottom",
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
