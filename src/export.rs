// src/export.rs
//
// Tabular export of detection results, one row per detection. The column
// set is what the downstream evaluation sheets expect: frame number,
// color, confidence, detector tag, then the bbox corners.

use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use crate::types::{BalloonColor, Detection};

pub const CSV_HEADER: &str = "frame,color,confidence,detector,bbox_x1,bbox_y1,bbox_x2,bbox_y2";

/// One exported row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub frame: u64,
    pub color: BalloonColor,
    pub confidence: f32,
    pub detector: String,
    pub bbox_x1: i32,
    pub bbox_y1: i32,
    pub bbox_x2: i32,
    pub bbox_y2: i32,
}

impl DetectionRecord {
    /// Flatten one frame's detections under a detector tag.
    pub fn from_detections(frame: u64, detector: &str, detections: &[Detection]) -> Vec<Self> {
        detections
            .iter()
            .map(|d| Self {
                frame,
                color: d.color,
                confidence: d.confidence,
                detector: detector.to_string(),
                bbox_x1: d.bbox.x1,
                bbox_y1: d.bbox.y1,
                bbox_x2: d.bbox.x2,
                bbox_y2: d.bbox.y2,
            })
            .collect()
    }
}

/// Write records as CSV with a three-decimal confidence column.
pub fn write_csv<W: Write>(out: &mut W, records: &[DetectionRecord]) -> Result<()> {
    writeln!(out, "{CSV_HEADER}")?;
    for r in records {
        writeln!(
            out,
            "{},{},{:.3},{},{},{},{},{}",
            r.frame,
            r.color.as_str(),
            r.confidence,
            r.detector,
            r.bbox_x1,
            r.bbox_y1,
            r.bbox_x2,
            r.bbox_y2
        )?;
    }
    Ok(())
}
