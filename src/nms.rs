// src/nms.rs
//
// Same-color non-maximum suppression over axis-aligned bounding boxes.

use std::cmp::Ordering;

use crate::types::{BoundingBox, Detection};

/// Intersection over union of two boxes. Returns 0 when the union is
/// empty, so degenerate boxes never match anything.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = ((x2 - x1).max(0) as f64) * ((y2 - y1).max(0) as f64);
    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy suppression, highest color ratio first (stable: ties keep
/// extraction order). An accepted detection removes the remaining
/// detections of the same color whose IoU with it reaches the threshold;
/// detections of a different color are never suppressed. Survivors come
/// back in acceptance order, which makes re-running a no-op.
pub fn suppress(mut detections: Vec<Detection>, iou_threshold: f64) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.color_ratio
            .partial_cmp(&a.color_ratio)
            .unwrap_or(Ordering::Equal)
    });

    let mut accepted = Vec::with_capacity(detections.len());
    while !detections.is_empty() {
        let best = detections.remove(0);
        detections.retain(|d| d.color != best.color || iou(&d.bbox, &best.bbox) < iou_threshold);
        accepted.push(best);
    }
    accepted
}
