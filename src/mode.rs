// src/mode.rs
//
// Threshold-regime state machine. A sharp drop in blue detections means
// the laser lighting has washed out the normal thresholds; a sustained
// recovery switches back. Decisions are made over a bounded history of
// per-frame blue counts, and the chosen regime only ever applies from the
// next frame on.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::info;

use crate::config::DetectionSettings;

/// Active threshold regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    Normal,
    Laser,
}

impl ThresholdMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdMode::Normal => "normal",
            ThresholdMode::Laser => "laser",
        }
    }

    #[inline]
    pub fn is_laser(&self) -> bool {
        matches!(self, ThresholdMode::Laser)
    }
}

/// Bounded-history mode controller. One instance per detector session;
/// never shared across streams.
#[derive(Debug, Clone)]
pub struct ModeController {
    mode: ThresholdMode,
    history: VecDeque<u32>,
    laser_frame_count: u32,

    history_size: usize,
    drop_threshold: f64,
    normal_mode_threshold: f64,
    min_laser_frames: u32,
}

impl ModeController {
    pub fn new(settings: &DetectionSettings) -> Self {
        Self {
            mode: ThresholdMode::Normal,
            history: VecDeque::with_capacity(settings.history_size),
            laser_frame_count: 0,
            history_size: settings.history_size,
            drop_threshold: settings.drop_threshold,
            normal_mode_threshold: settings.normal_mode_threshold,
            min_laser_frames: settings.min_laser_frames,
        }
    }

    pub fn mode(&self) -> ThresholdMode {
        self.mode
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Feed one frame's accepted blue-detection count. Transitions are only
    /// evaluated once the history is full; the returned mode applies to the
    /// next frame.
    pub fn observe(&mut self, blue_count: u32) -> ThresholdMode {
        self.history.push_back(blue_count);
        if self.history.len() > self.history_size {
            self.history.pop_front();
        }
        if self.history.len() == self.history_size {
            self.evaluate();
        }
        self.mode
    }

    /// Manual regime override for when automatic switching is disabled.
    pub fn force(&mut self, mode: ThresholdMode) {
        self.mode = mode;
    }

    fn evaluate(&mut self) {
        let n = self.history.len();
        let avg = self
            .history
            .iter()
            .take(n - 1)
            .map(|&c| c as f64)
            .sum::<f64>()
            / (n - 1) as f64;
        let current = self.history[n - 1] as f64;

        match self.mode {
            ThresholdMode::Normal => {
                if current < avg * self.drop_threshold && avg > 0.0 {
                    self.mode = ThresholdMode::Laser;
                    self.laser_frame_count = 0;
                    info!(
                        "blue count dropped ({current:.0} vs avg {avg:.1}), switching to laser thresholds"
                    );
                }
            }
            ThresholdMode::Laser => {
                self.laser_frame_count += 1;
                if self.laser_frame_count >= self.min_laser_frames
                    && current >= avg * self.normal_mode_threshold
                {
                    self.mode = ThresholdMode::Normal;
                    info!(
                        "blue count recovered ({current:.0} vs avg {avg:.1}) after {} laser frames, back to normal thresholds",
                        self.laser_frame_count
                    );
                }
            }
        }
    }
}
