// src/types.rs

use anyhow::{ensure, Result};
use serde::Serialize;

/// One RGB8 video frame. Owned by the caller; the engine borrows it for
/// the duration of a single `detect` call and never retains a reference.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Result<Self> {
        ensure!(
            data.len() == width * height * 3,
            "frame buffer is {} bytes, expected {} for {}x{} RGB",
            data.len(),
            width * height * 3,
            width,
            height
        );
        Ok(Self {
            data,
            width,
            height,
        })
    }

    #[inline]
    pub fn rgb(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let idx = (y * self.width + x) * 3;
        (self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }
}

/// Single-channel binary bitmap (0 or 255), frame-sized and transient:
/// produced and consumed within one detection call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Mask {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            data: vec![0; width * height],
            width,
            height,
        }
    }

    #[inline]
    pub fn is_set(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize) {
        self.data[y * self.width + x] = 255;
    }

    /// Set pixels inside the half-open rectangle [x1,x2) x [y1,y2).
    pub fn count_set_in_rect(&self, x1: usize, y1: usize, x2: usize, y2: usize) -> usize {
        let mut count = 0;
        for y in y1..y2.min(self.height) {
            for x in x1..x2.min(self.width) {
                if self.is_set(x, y) {
                    count += 1;
                }
            }
        }
        count
    }
}

/// Color class of a detected balloon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BalloonColor {
    Red,
    Blue,
}

impl BalloonColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalloonColor::Red => "red",
            BalloonColor::Blue => "blue",
        }
    }
}

/// Axis-aligned box in pixel coordinates, half-open on the right/bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn area(&self) -> f64 {
        ((self.x2 - self.x1) as f64) * ((self.y2 - self.y1) as f64)
    }
}

/// Rotated ellipse fitted to a detected region. Axes are full diameters
/// with `major >= minor`; the angle is the major-axis direction in
/// degrees, normalized to [0, 180).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EllipseFit {
    pub cx: f64,
    pub cy: f64,
    pub major: f64,
    pub minor: f64,
    pub angle_deg: f64,
}

impl EllipseFit {
    #[inline]
    pub fn aspect_ratio(&self) -> f64 {
        self.major / self.minor
    }
}

/// One accepted balloon detection. Immutable once created; every field is
/// populated on every emitted detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub color: BalloonColor,
    pub color_ratio: f32,
    pub ellipse: EllipseFit,
    pub laser_mode: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_short_buffer() {
        assert!(Frame::new(vec![0u8; 10], 4, 4).is_err());
        assert!(Frame::new(vec![0u8; 48], 4, 4).is_ok());
    }

    #[test]
    fn test_mask_rect_count() {
        let mut mask = Mask::zeros(4, 4);
        mask.set(1, 1);
        mask.set(2, 1);
        mask.set(3, 3);
        assert_eq!(mask.count_set_in_rect(0, 0, 4, 4), 3);
        assert_eq!(mask.count_set_in_rect(1, 1, 3, 2), 2);
        assert_eq!(mask.count_set_in_rect(0, 0, 1, 1), 0);
        // Clamped past the edge
        assert_eq!(mask.count_set_in_rect(0, 0, 10, 10), 3);
    }

    #[test]
    fn test_bbox_area() {
        let b = BoundingBox {
            x1: 2,
            y1: 3,
            x2: 6,
            y2: 8,
        };
        assert_eq!(b.area(), 20.0);
    }
}
