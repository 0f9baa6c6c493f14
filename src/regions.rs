// src/regions.rs
//
// Region extraction and ellipse fitting sit behind a small capability
// trait so the image-processing backend can be swapped without touching
// the detector.

use nalgebra::Matrix2;

use crate::types::{EllipseFit, Mask};

/// One connected region of set mask pixels.
#[derive(Debug, Clone)]
pub struct Region {
    /// Every set pixel in the component.
    pub pixels: Vec<(u32, u32)>,
    /// Component pixels with at least one unset 4-neighbor (the outer edge).
    pub boundary: Vec<(u32, u32)>,
}

impl Region {
    #[inline]
    pub fn area(&self) -> f64 {
        self.pixels.len() as f64
    }
}

/// Vision-primitive capability interface used by the detector.
pub trait RegionAnalyzer {
    /// External connected regions of the mask.
    fn find_regions(&self, mask: &Mask) -> Vec<Region>;

    /// Rotated ellipse for a region's pixel set, or None when the set is
    /// degenerate (empty, collinear, single pixel).
    fn fit_ellipse(&self, pixels: &[(u32, u32)]) -> Option<EllipseFit>;
}

/// Default backend: 4-connected component labeling plus a second-moment
/// ellipse fit (centroid + covariance eigen-decomposition; a solid
/// ellipse's covariance eigenvalues are (semi-axis/2)^2, so each diameter
/// is 4*sqrt(eigenvalue)).
#[derive(Debug, Clone, Copy, Default)]
pub struct MomentAnalyzer;

const NEIGHBORS: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

impl RegionAnalyzer for MomentAnalyzer {
    fn find_regions(&self, mask: &Mask) -> Vec<Region> {
        let (w, h) = (mask.width, mask.height);
        let mut visited = vec![false; w * h];
        let mut regions = Vec::new();
        let mut stack = Vec::new();

        for start_y in 0..h {
            for start_x in 0..w {
                if visited[start_y * w + start_x] || !mask.is_set(start_x, start_y) {
                    continue;
                }

                visited[start_y * w + start_x] = true;
                stack.push((start_x, start_y));
                let mut pixels = Vec::new();
                let mut boundary = Vec::new();

                while let Some((x, y)) = stack.pop() {
                    pixels.push((x as u32, y as u32));

                    let mut on_edge = false;
                    for (dx, dy) in NEIGHBORS {
                        let nx = x as i64 + dx;
                        let ny = y as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            on_edge = true;
                            continue;
                        }
                        let (nx, ny) = (nx as usize, ny as usize);
                        if !mask.is_set(nx, ny) {
                            on_edge = true;
                            continue;
                        }
                        if !visited[ny * w + nx] {
                            visited[ny * w + nx] = true;
                            stack.push((nx, ny));
                        }
                    }
                    if on_edge {
                        boundary.push((x as u32, y as u32));
                    }
                }

                regions.push(Region { pixels, boundary });
            }
        }

        regions
    }

    fn fit_ellipse(&self, pixels: &[(u32, u32)]) -> Option<EllipseFit> {
        if pixels.is_empty() {
            return None;
        }
        let n = pixels.len() as f64;

        let mut sx = 0.0;
        let mut sy = 0.0;
        for &(x, y) in pixels {
            sx += x as f64;
            sy += y as f64;
        }
        let cx = sx / n;
        let cy = sy / n;

        // Central second moments
        let mut mxx = 0.0;
        let mut myy = 0.0;
        let mut mxy = 0.0;
        for &(x, y) in pixels {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            mxx += dx * dx;
            myy += dy * dy;
            mxy += dx * dy;
        }
        mxx /= n;
        myy /= n;
        mxy /= n;

        let eig = Matrix2::new(mxx, mxy, mxy, myy).symmetric_eigen();
        let (l0, l1) = (eig.eigenvalues[0], eig.eigenvalues[1]);
        let (major_val, minor_val, axis) = if l0 >= l1 {
            (l0, l1, eig.eigenvectors.column(0).into_owned())
        } else {
            (l1, l0, eig.eigenvectors.column(1).into_owned())
        };

        let major = 4.0 * major_val.max(0.0).sqrt();
        let minor = 4.0 * minor_val.max(0.0).sqrt();
        if minor <= 0.0 {
            return None;
        }

        let mut angle_deg = axis[1].atan2(axis[0]).to_degrees();
        if angle_deg < 0.0 {
            angle_deg += 180.0;
        }
        if angle_deg >= 180.0 {
            angle_deg -= 180.0;
        }

        Some(EllipseFit {
            cx,
            cy,
            major,
            minor,
            angle_deg,
        })
    }
}
