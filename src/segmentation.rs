// src/segmentation.rs
//
// HSV color segmentation. Thresholds use the OpenCV value scale the
// presets were tuned on: H in [0, 180] (degrees halved), S and V in
// [0, 255]. Pure functions of their inputs; no state.

use crate::config::ThresholdBundle;
use crate::mode::ThresholdMode;
use crate::types::{Frame, Mask};

/// Per-color binary masks for one frame.
#[derive(Debug, Clone)]
pub struct MaskSet {
    pub red: Mask,
    pub blue: Mask,
    /// red OR blue; the region extractor runs on this one.
    pub combined: Mask,
}

/// Convert one RGB pixel to HSV on the OpenCV scale.
#[inline]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r_n = r as f32 / 255.0;
    let g_n = g as f32 / 255.0;
    let b_n = b as f32 / 255.0;

    let max = r_n.max(g_n).max(b_n);
    let min = r_n.min(g_n).min(b_n);
    let delta = max - min;

    let h_deg = if delta < 1e-6 {
        0.0
    } else if (max - r_n).abs() < 1e-6 {
        60.0 * (((g_n - b_n) / delta) % 6.0)
    } else if (max - g_n).abs() < 1e-6 {
        60.0 * (((b_n - r_n) / delta) + 2.0)
    } else {
        60.0 * (((r_n - g_n) / delta) + 4.0)
    };
    let h_deg = if h_deg < 0.0 { h_deg + 360.0 } else { h_deg };

    let s = if max < 1e-6 { 0.0 } else { delta / max };

    let h = (h_deg / 2.0).round() as u8;
    let s = (s * 255.0).round() as u8;
    let v = (max * 255.0).round() as u8;
    (h, s, v)
}

/// Build the per-color masks for the active regime: blue from its single
/// range, red as the union of its two hue-wrapped ranges, combined as the
/// union of both colors.
pub fn segment(frame: &Frame, bundle: &ThresholdBundle, mode: ThresholdMode) -> MaskSet {
    let blue_range = bundle.blue(mode);
    let red1 = bundle.red1(mode);
    let red2 = bundle.red2(mode);

    let mut red = Mask::zeros(frame.width, frame.height);
    let mut blue = Mask::zeros(frame.width, frame.height);
    let mut combined = Mask::zeros(frame.width, frame.height);

    for y in 0..frame.height {
        for x in 0..frame.width {
            let (r, g, b) = frame.rgb(x, y);
            let (h, s, v) = rgb_to_hsv(r, g, b);

            let is_red = red1.contains(h, s, v) || red2.contains(h, s, v);
            let is_blue = blue_range.contains(h, s, v);

            if is_red {
                red.set(x, y);
            }
            if is_blue {
                blue.set(x, y);
            }
            if is_red || is_blue {
                combined.set(x, y);
            }
        }
    }

    MaskSet {
        red,
        blue,
        combined,
    }
}
