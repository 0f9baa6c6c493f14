// src/detector.rs
//
// The detection session: segmentation, candidate extraction, duplicate
// suppression, and automatic threshold-regime switching. One session per
// video stream; all call-spanning state lives here.

use anyhow::{ensure, Result};
use serde::Serialize;
use tracing::debug;

use crate::config::{DetectionSettings, ThresholdBundle};
use crate::mode::{ModeController, ThresholdMode};
use crate::nms;
use crate::regions::{MomentAnalyzer, Region, RegionAnalyzer};
use crate::segmentation::{segment, MaskSet};
use crate::types::{BalloonColor, BoundingBox, Detection, Frame, Mask};

/// Per-frame counts and regime labels, the shape a stats overlay consumes.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub blue_count: usize,
    pub red_count: usize,
    pub mode: ThresholdMode,
    pub auto_mode: bool,
}

pub struct BalloonDetector<A: RegionAnalyzer = MomentAnalyzer> {
    settings: DetectionSettings,
    analyzer: A,
    mode: ModeController,
    auto_mode: bool,
}

impl BalloonDetector<MomentAnalyzer> {
    pub fn new(settings: DetectionSettings) -> Result<Self> {
        Self::with_analyzer(settings, MomentAnalyzer)
    }
}

impl<A: RegionAnalyzer> BalloonDetector<A> {
    pub fn with_analyzer(settings: DetectionSettings, analyzer: A) -> Result<Self> {
        settings.validate()?;
        let mode = ModeController::new(&settings);
        Ok(Self {
            settings,
            analyzer,
            mode,
            auto_mode: true,
        })
    }

    pub fn mode(&self) -> ThresholdMode {
        self.mode.mode()
    }

    pub fn auto_mode(&self) -> bool {
        self.auto_mode
    }

    /// Enable or disable automatic regime switching. While disabled the
    /// controller is frozen and `set_laser_mode` drives the regime.
    pub fn set_auto_mode(&mut self, enabled: bool) {
        self.auto_mode = enabled;
    }

    /// Manual regime override; ignored while automatic mode is on.
    pub fn set_laser_mode(&mut self, enabled: bool) {
        if !self.auto_mode {
            self.mode.force(if enabled {
                ThresholdMode::Laser
            } else {
                ThresholdMode::Normal
            });
        }
    }

    /// Run one frame through the engine. Returns the accepted detections
    /// in acceptance order together with the combined segmentation mask.
    /// The blue-detection count feeds the mode controller, so the regime
    /// chosen here applies from the next frame on.
    pub fn detect(
        &mut self,
        frame: &Frame,
        bundle: &ThresholdBundle,
    ) -> Result<(Vec<Detection>, Mask)> {
        bundle.validate()?;
        ensure!(
            frame.data.len() == frame.width * frame.height * 3,
            "frame buffer is {} bytes, expected {} for {}x{} RGB",
            frame.data.len(),
            frame.width * frame.height * 3,
            frame.width,
            frame.height
        );

        let regime = self.mode.mode();
        let masks = segment(frame, bundle, regime);
        let raw = self.extract_candidates(&masks, regime);
        let detections = nms::suppress(raw, self.settings.iou_threshold);

        if self.auto_mode {
            let blue_count = detections
                .iter()
                .filter(|d| d.color == BalloonColor::Blue)
                .count();
            self.mode.observe(blue_count as u32);
        }

        Ok((detections, masks.combined))
    }

    pub fn summary(&self, detections: &[Detection]) -> FrameSummary {
        FrameSummary {
            blue_count: detections
                .iter()
                .filter(|d| d.color == BalloonColor::Blue)
                .count(),
            red_count: detections
                .iter()
                .filter(|d| d.color == BalloonColor::Red)
                .count(),
            mode: self.mode.mode(),
            auto_mode: self.auto_mode,
        }
    }

    fn extract_candidates(&self, masks: &MaskSet, regime: ThresholdMode) -> Vec<Detection> {
        let mut detections = Vec::new();
        for region in self.analyzer.find_regions(&masks.combined) {
            let area = region.area();
            if !(area > self.settings.min_area && area < self.settings.max_area) {
                continue;
            }
            if let Some(detection) = self.process_region(&region, masks, regime) {
                detections.push(detection);
            }
        }
        detections
    }

    /// Geometry and color-purity filters for one region. A None is a
    /// silent rejection, not an error.
    fn process_region(
        &self,
        region: &Region,
        masks: &MaskSet,
        regime: ThresholdMode,
    ) -> Option<Detection> {
        // Too few edge points to fit an ellipse against
        if region.boundary.len() < 5 {
            return None;
        }

        let ellipse = self.analyzer.fit_ellipse(&region.pixels)?;
        let aspect = ellipse.aspect_ratio();
        if aspect >= self.settings.max_aspect_ratio {
            debug!("candidate rejected: aspect ratio {aspect:.2}");
            return None;
        }

        // ROI: the ellipse's bounding box clamped to the frame
        let width = masks.combined.width;
        let height = masks.combined.height;
        let x1 = (ellipse.cx - ellipse.major / 2.0).max(0.0) as i32;
        let x2 = (ellipse.cx + ellipse.major / 2.0).min(width as f64) as i32;
        let y1 = (ellipse.cy - ellipse.minor / 2.0).max(0.0) as i32;
        let y2 = (ellipse.cy + ellipse.minor / 2.0).min(height as f64) as i32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let total = ((x2 - x1) * (y2 - y1)) as f64;
        let red_pixels =
            masks
                .red
                .count_set_in_rect(x1 as usize, y1 as usize, x2 as usize, y2 as usize);
        let blue_pixels =
            masks
                .blue
                .count_set_in_rect(x1 as usize, y1 as usize, x2 as usize, y2 as usize);
        let red_ratio = red_pixels as f64 / total;
        let blue_ratio = blue_pixels as f64 / total;

        if red_ratio.max(blue_ratio) <= self.settings.min_color_ratio {
            debug!(
                "candidate rejected: color ratio {:.2}",
                red_ratio.max(blue_ratio)
            );
            return None;
        }

        let (color, color_ratio) = if red_ratio > blue_ratio {
            (BalloonColor::Red, red_ratio)
        } else {
            (BalloonColor::Blue, blue_ratio)
        };

        Some(Detection {
            bbox: BoundingBox { x1, y1, x2, y2 },
            confidence: (1.0 / aspect) as f32,
            color,
            color_ratio: color_ratio as f32,
            ellipse,
            laser_mode: regime.is_laser(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const BLUE_RGB: [u8; 3] = [0, 128, 255]; // H=105, inside both blue ranges
    const RED_RGB: [u8; 3] = [255, 0, 0]; // H=0, inside both red1 ranges

    fn blank_frame(width: usize, height: usize) -> Frame {
        Frame::new(vec![0u8; width * height * 3], width, height).unwrap()
    }

    fn paint_ellipse(frame: &mut Frame, cx: f64, cy: f64, a: f64, b: f64, rgb: [u8; 3]) {
        for y in 0..frame.height {
            for x in 0..frame.width {
                let dx = (x as f64 - cx) / a;
                let dy = (y as f64 - cy) / b;
                if dx * dx + dy * dy <= 1.0 {
                    let idx = (y * frame.width + x) * 3;
                    frame.data[idx..idx + 3].copy_from_slice(&rgb);
                }
            }
        }
    }

    #[test]
    fn test_detect_single_blue_ellipse() {
        let mut frame = blank_frame(120, 100);
        // ~1131 px area, aspect ~1.11
        paint_ellipse(&mut frame, 60.0, 50.0, 20.0, 18.0, BLUE_RGB);

        let mut detector = BalloonDetector::new(DetectionSettings::default()).unwrap();
        let bundle = ThresholdBundle::default();
        let (detections, combined) = detector.detect(&frame, &bundle).unwrap();

        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.color, BalloonColor::Blue);
        assert!(!d.laser_mode);
        assert_relative_eq!(d.ellipse.cx, 60.0, epsilon = 0.5);
        assert_relative_eq!(d.ellipse.cy, 50.0, epsilon = 0.5);
        assert!(d.confidence > 0.8 && d.confidence < 1.0);

        // The reported ratio is the true blue fraction of the ROI
        let blue_in_roi = combined.count_set_in_rect(
            d.bbox.x1 as usize,
            d.bbox.y1 as usize,
            d.bbox.x2 as usize,
            d.bbox.y2 as usize,
        );
        let expected = blue_in_roi as f64 / d.bbox.area();
        assert_relative_eq!(f64::from(d.color_ratio), expected, epsilon = 1e-6);
        assert!(d.color_ratio > 0.3);

        // The combined mask covers exactly the painted pixels
        for y in 0..frame.height {
            for x in 0..frame.width {
                let painted = frame.rgb(x, y) != (0, 0, 0);
                assert_eq!(combined.is_set(x, y), painted, "pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn test_red_and_blue_coexist() {
        let mut frame = blank_frame(200, 100);
        paint_ellipse(&mut frame, 50.0, 50.0, 16.0, 15.0, RED_RGB);
        paint_ellipse(&mut frame, 150.0, 50.0, 16.0, 15.0, BLUE_RGB);

        let mut detector = BalloonDetector::new(DetectionSettings::default()).unwrap();
        let (detections, _) = detector
            .detect(&frame, &ThresholdBundle::default())
            .unwrap();

        assert_eq!(detections.len(), 2);
        let summary = detector.summary(&detections);
        assert_eq!(summary.red_count, 1);
        assert_eq!(summary.blue_count, 1);
        assert!(summary.auto_mode);
    }

    #[test]
    fn test_small_and_huge_regions_rejected() {
        let mut frame = blank_frame(300, 200);
        // ~113 px: below min_area
        paint_ellipse(&mut frame, 30.0, 30.0, 6.0, 6.0, BLUE_RGB);
        // ~17.6k px: above max_area
        paint_ellipse(&mut frame, 180.0, 100.0, 75.0, 75.0, RED_RGB);

        let mut detector = BalloonDetector::new(DetectionSettings::default()).unwrap();
        let (detections, _) = detector
            .detect(&frame, &ThresholdBundle::default())
            .unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn test_elongated_region_rejected_by_aspect() {
        let mut frame = blank_frame(200, 100);
        // aspect 30/10 = 3.0 >= 1.5
        paint_ellipse(&mut frame, 100.0, 50.0, 30.0, 10.0, BLUE_RGB);

        let mut detector = BalloonDetector::new(DetectionSettings::default()).unwrap();
        let (detections, _) = detector
            .detect(&frame, &ThresholdBundle::default())
            .unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn test_color_ratio_tie_resolves_to_blue() {
        // A 10x10 square, left half red and right half blue: one combined
        // region, equal ratios in the ROI.
        let mut frame = blank_frame(10, 10);
        for y in 0..10 {
            for x in 0..10 {
                let idx = (y * 10 + x) * 3;
                let rgb = if x < 5 { RED_RGB } else { BLUE_RGB };
                frame.data[idx..idx + 3].copy_from_slice(&rgb);
            }
        }

        let settings = DetectionSettings {
            min_area: 10.0,
            ..DetectionSettings::default()
        };
        let mut detector = BalloonDetector::new(settings).unwrap();
        let (detections, _) = detector
            .detect(&frame, &ThresholdBundle::default())
            .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].color, BalloonColor::Blue);
        assert_relative_eq!(f64::from(detections[0].color_ratio), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_blue_disappearance_switches_regime() {
        let mut balloon_frame = blank_frame(120, 100);
        paint_ellipse(&mut balloon_frame, 60.0, 50.0, 20.0, 18.0, BLUE_RGB);
        let empty_frame = blank_frame(120, 100);

        let mut detector = BalloonDetector::new(DetectionSettings::default()).unwrap();
        let bundle = ThresholdBundle::default();

        for _ in 0..10 {
            let (detections, _) = detector.detect(&balloon_frame, &bundle).unwrap();
            assert_eq!(detections.len(), 1);
            assert_eq!(detector.mode(), ThresholdMode::Normal);
        }

        // Blue vanishes: 0 < 1.0 * 0.5, so the next frame runs laser
        detector.detect(&empty_frame, &bundle).unwrap();
        assert_eq!(detector.mode(), ThresholdMode::Laser);

        let (detections, _) = detector.detect(&balloon_frame, &bundle).unwrap();
        assert_eq!(detections.len(), 1);
        assert!(detections[0].laser_mode);
    }

    #[test]
    fn test_manual_override_requires_auto_off() {
        let mut detector = BalloonDetector::new(DetectionSettings::default()).unwrap();

        detector.set_laser_mode(true);
        assert_eq!(detector.mode(), ThresholdMode::Normal);

        detector.set_auto_mode(false);
        detector.set_laser_mode(true);
        assert_eq!(detector.mode(), ThresholdMode::Laser);

        // With auto off, detect calls leave the controller untouched
        let frame = blank_frame(20, 20);
        for _ in 0..15 {
            detector.detect(&frame, &ThresholdBundle::default()).unwrap();
        }
        assert_eq!(detector.mode(), ThresholdMode::Laser);

        detector.set_laser_mode(false);
        assert_eq!(detector.mode(), ThresholdMode::Normal);
    }

    /// Backend stub reporting a fixed ellipse, to pin filter boundaries.
    struct FixedEllipseAnalyzer {
        major: f64,
        minor: f64,
    }

    impl RegionAnalyzer for FixedEllipseAnalyzer {
        fn find_regions(&self, mask: &Mask) -> Vec<Region> {
            MomentAnalyzer.find_regions(mask)
        }

        fn fit_ellipse(&self, _pixels: &[(u32, u32)]) -> Option<crate::types::EllipseFit> {
            Some(crate::types::EllipseFit {
                cx: 30.0,
                cy: 30.0,
                major: self.major,
                minor: self.minor,
                angle_deg: 0.0,
            })
        }
    }

    #[test]
    fn test_aspect_boundary_is_exclusive() {
        let mut frame = blank_frame(60, 60);
        paint_ellipse(&mut frame, 30.0, 30.0, 12.0, 12.0, BLUE_RGB);
        let bundle = ThresholdBundle::default();

        // Exactly at the limit: 30/20 = 1.5 fails the strict comparison
        let analyzer = FixedEllipseAnalyzer {
            major: 30.0,
            minor: 20.0,
        };
        let mut detector =
            BalloonDetector::with_analyzer(DetectionSettings::default(), analyzer).unwrap();
        let (detections, _) = detector.detect(&frame, &bundle).unwrap();
        assert!(detections.is_empty());

        // Just under the limit passes
        let analyzer = FixedEllipseAnalyzer {
            major: 30.0,
            minor: 20.5,
        };
        let mut detector =
            BalloonDetector::with_analyzer(DetectionSettings::default(), analyzer).unwrap();
        let (detections, _) = detector.detect(&frame, &bundle).unwrap();
        assert_eq!(detections.len(), 1);
    }

    #[test]
    fn test_malformed_bundle_is_fatal() {
        let mut bundle = ThresholdBundle::default();
        bundle.normal_red2.h_max = 250;

        let mut detector = BalloonDetector::new(DetectionSettings::default()).unwrap();
        let frame = blank_frame(8, 8);
        assert!(detector.detect(&frame, &bundle).is_err());
    }

    #[test]
    fn test_invalid_settings_rejected_at_construction() {
        let settings = DetectionSettings {
            history_size: 1,
            ..DetectionSettings::default()
        };
        assert!(BalloonDetector::new(settings).is_err());
    }
}
