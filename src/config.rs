// src/config.rs
//
// Typed configuration for the detection engine. The threshold bundle is
// validated once at load/construction time; a missing or out-of-range
// field is a fatal configuration error, never silently defaulted.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::mode::ThresholdMode;

/// Inclusive HSV bounds on the OpenCV scale: H in [0, 180], S and V in
/// [0, 255]. The presets were tuned on that scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub h_min: u8,
    pub h_max: u8,
    pub s_min: u8,
    pub s_max: u8,
    pub v_min: u8,
    pub v_max: u8,
}

impl HsvRange {
    pub const fn new(h_min: u8, h_max: u8, s_min: u8, s_max: u8, v_min: u8, v_max: u8) -> Self {
        Self {
            h_min,
            h_max,
            s_min,
            s_max,
            v_min,
            v_max,
        }
    }

    /// A pixel matches when every channel sits inside its inclusive bounds.
    #[inline]
    pub fn contains(&self, h: u8, s: u8, v: u8) -> bool {
        h >= self.h_min
            && h <= self.h_max
            && s >= self.s_min
            && s <= self.s_max
            && v >= self.v_min
            && v <= self.v_max
    }

    fn validate(&self, name: &str) -> Result<()> {
        ensure!(self.h_max <= 180, "{name}: h_max {} exceeds 180", self.h_max);
        ensure!(
            self.h_min <= self.h_max,
            "{name}: h_min {} > h_max {}",
            self.h_min,
            self.h_max
        );
        ensure!(
            self.s_min <= self.s_max,
            "{name}: s_min {} > s_max {}",
            self.s_min,
            self.s_max
        );
        ensure!(
            self.v_min <= self.v_max,
            "{name}: v_min {} > v_max {}",
            self.v_min,
            self.v_max
        );
        Ok(())
    }
}

/// The six named HSV ranges the detector switches between. Red needs two
/// ranges because its hue wraps around the 0/180 seam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdBundle {
    pub normal_blue: HsvRange,
    pub normal_red1: HsvRange,
    pub normal_red2: HsvRange,
    pub laser_blue: HsvRange,
    pub laser_red1: HsvRange,
    pub laser_red2: HsvRange,
}

impl Default for ThresholdBundle {
    fn default() -> Self {
        Self {
            normal_blue: HsvRange::new(70, 110, 90, 255, 80, 255),
            normal_red1: HsvRange::new(0, 10, 100, 255, 100, 255),
            normal_red2: HsvRange::new(160, 180, 100, 255, 50, 255),
            laser_blue: HsvRange::new(60, 115, 90, 255, 70, 255),
            laser_red1: HsvRange::new(0, 10, 150, 255, 200, 255),
            laser_red2: HsvRange::new(128, 180, 180, 255, 128, 255),
        }
    }
}

impl ThresholdBundle {
    pub fn validate(&self) -> Result<()> {
        self.normal_blue.validate("normal_blue")?;
        self.normal_red1.validate("normal_red1")?;
        self.normal_red2.validate("normal_red2")?;
        self.laser_blue.validate("laser_blue")?;
        self.laser_red1.validate("laser_red1")?;
        self.laser_red2.validate("laser_red2")?;
        Ok(())
    }

    pub fn blue(&self, mode: ThresholdMode) -> &HsvRange {
        match mode {
            ThresholdMode::Normal => &self.normal_blue,
            ThresholdMode::Laser => &self.laser_blue,
        }
    }

    pub fn red1(&self, mode: ThresholdMode) -> &HsvRange {
        match mode {
            ThresholdMode::Normal => &self.normal_red1,
            ThresholdMode::Laser => &self.laser_red1,
        }
    }

    pub fn red2(&self, mode: ThresholdMode) -> &HsvRange {
        match mode {
            ThresholdMode::Normal => &self.normal_red2,
            ThresholdMode::Laser => &self.laser_red2,
        }
    }
}

/// Geometry/color filter limits and mode-controller tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Contour area window, strict on both ends.
    pub min_area: f64,
    pub max_area: f64,
    /// Candidates at or above this major/minor ratio are rejected.
    pub max_aspect_ratio: f64,
    /// Winning color must cover strictly more than this fraction of the ROI.
    pub min_color_ratio: f64,
    pub iou_threshold: f64,
    /// Frames of blue-count history kept for regime evaluation.
    pub history_size: usize,
    pub drop_threshold: f64,
    pub normal_mode_threshold: f64,
    pub min_laser_frames: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            min_area: 300.0,
            max_area: 15000.0,
            max_aspect_ratio: 1.5,
            min_color_ratio: 0.3,
            iou_threshold: 0.5,
            history_size: 10,
            drop_threshold: 0.5,
            normal_mode_threshold: 0.8,
            min_laser_frames: 20,
        }
    }
}

impl DetectionSettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.min_area >= 0.0, "min_area must be non-negative");
        ensure!(
            self.min_area < self.max_area,
            "min_area {} must be below max_area {}",
            self.min_area,
            self.max_area
        );
        ensure!(
            self.max_aspect_ratio >= 1.0,
            "max_aspect_ratio {} must be at least 1.0",
            self.max_aspect_ratio
        );
        ensure!(
            (0.0..=1.0).contains(&self.min_color_ratio),
            "min_color_ratio {} must be in [0, 1]",
            self.min_color_ratio
        );
        ensure!(
            (0.0..=1.0).contains(&self.iou_threshold),
            "iou_threshold {} must be in [0, 1]",
            self.iou_threshold
        );
        ensure!(
            self.history_size >= 2,
            "history_size {} must be at least 2",
            self.history_size
        );
        Ok(())
    }
}

/// Complete engine configuration, loadable from YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub detection: DetectionSettings,
    pub thresholds: ThresholdBundle,
}

impl DetectorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: DetectorConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        self.thresholds.validate()?;
        Ok(())
    }
}
