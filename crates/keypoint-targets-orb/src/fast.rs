use keypoint_targets_core::{FeatureDetector, GrayImageView, Keypoint};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Bresenham circle of radius 3 used by the segment test.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Contiguous arc length required by FAST-9.
const ARC: usize = 9;

/// FAST detector settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastParams {
    /// Intensity difference a circle pixel needs to count as brighter/darker.
    pub threshold: u8,
    /// Keep at most this many keypoints (strongest first).
    pub max_keypoints: usize,
    /// Side of the suppression grid cell, in pixels.
    pub nms_cell: f32,
    /// Keypoint size reported to downstream stages.
    pub keypoint_size: f32,
}

impl Default for FastParams {
    fn default() -> Self {
        Self {
            threshold: 20,
            max_keypoints: 1000,
            nms_cell: 5.0,
            keypoint_size: 31.0,
        }
    }
}

/// FAST-9 corner detector.
#[derive(Clone, Debug, Default)]
pub struct FastDetector {
    params: FastParams,
}

impl FastDetector {
    pub fn new(params: FastParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &FastParams {
        &self.params
    }

    /// Segment-test score at `(x, y)`, or `None` if it is not a corner.
    fn corner_score(&self, img: &GrayImageView<'_>, x: i32, y: i32) -> Option<f32> {
        let c = img.get(x, y) as i32;
        let t = self.params.threshold as i32;

        // Cardinal pre-check: a 9-arc always covers at least 2 of the 4 compass points.
        let cardinal = [CIRCLE[0], CIRCLE[4], CIRCLE[8], CIRCLE[12]];
        let (mut nb, mut nd) = (0, 0);
        for (dx, dy) in cardinal {
            let p = img.get(x + dx, y + dy) as i32;
            if p > c + t {
                nb += 1;
            } else if p < c - t {
                nd += 1;
            }
        }
        if nb < 2 && nd < 2 {
            return None;
        }

        let ring: [i32; 16] = CIRCLE.map(|(dx, dy)| img.get(x + dx, y + dy) as i32);

        let (mut run_b, mut run_d, mut best_b, mut best_d) = (0usize, 0usize, 0usize, 0usize);
        for i in 0..32 {
            let p = ring[i % 16];
            if p > c + t {
                run_b += 1;
                run_d = 0;
            } else if p < c - t {
                run_d += 1;
                run_b = 0;
            } else {
                run_b = 0;
                run_d = 0;
            }
            best_b = best_b.max(run_b.min(16));
            best_d = best_d.max(run_d.min(16));
        }
        if best_b < ARC && best_d < ARC {
            return None;
        }

        let bright = best_b >= ARC;
        let score: i32 = ring
            .iter()
            .map(|&p| {
                if bright {
                    (p - c - t).max(0)
                } else {
                    (c - p - t).max(0)
                }
            })
            .sum();
        Some(score as f32)
    }

    fn suppress(&self, mut corners: Vec<Keypoint>) -> Vec<Keypoint> {
        corners.sort_by(|a, b| b.response.total_cmp(&a.response));

        let cell = self.params.nms_cell.max(1.0);
        let mut occupied = HashSet::new();
        let mut selected = Vec::new();
        for kp in corners {
            let gx = (kp.position.x / cell) as i32;
            let gy = (kp.position.y / cell) as i32;
            let blocked = (-1..=1)
                .flat_map(|dy| (-1..=1).map(move |dx| (gx + dx, gy + dy)))
                .any(|c| occupied.contains(&c));
            if blocked {
                continue;
            }
            occupied.insert((gx, gy));
            selected.push(kp);
            if selected.len() >= self.params.max_keypoints {
                break;
            }
        }
        selected
    }
}

impl FeatureDetector for FastDetector {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, image), fields(width = image.width, height = image.height))
    )]
    fn detect(&self, image: &GrayImageView<'_>) -> Vec<Keypoint> {
        if image.width < 7 || image.height < 7 {
            return Vec::new();
        }
        let (w, h) = (image.width as i32, image.height as i32);
        let size = self.params.keypoint_size;

        let corners: Vec<Keypoint> = (3..h - 3)
            .into_par_iter()
            .flat_map_iter(|y| {
                (3..w - 3).filter_map(move |x| {
                    self.corner_score(image, x, y).map(|response| Keypoint {
                        response,
                        size,
                        ..Keypoint::at(x as f32, y as f32)
                    })
                })
            })
            .collect();

        let kept = self.suppress(corners);
        log::trace!("fast: {} keypoints", kept.len());
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keypoint_targets_core::GrayImage;

    fn square_image() -> GrayImage {
        let mut img = GrayImage::new(64, 64);
        for y in 20..44 {
            for x in 20..44 {
                img.set(x, y, 220);
            }
        }
        img
    }

    #[test]
    fn finds_square_corners() {
        let img = square_image();
        let det = FastDetector::default();
        let kps = det.detect(&img.view());
        assert!(!kps.is_empty());
        for (cx, cy) in [(20.0, 20.0), (43.0, 20.0), (20.0, 43.0), (43.0, 43.0)] {
            let near = kps
                .iter()
                .any(|k| (k.position.x - cx).abs() <= 3.0 && (k.position.y - cy).abs() <= 3.0);
            assert!(near, "no keypoint near ({cx}, {cy})");
        }
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = GrayImage::new(40, 40);
        assert!(FastDetector::default().detect(&img.view()).is_empty());
    }

    #[test]
    fn respects_keypoint_budget() {
        let img = square_image();
        let det = FastDetector::new(FastParams {
            max_keypoints: 2,
            ..FastParams::default()
        });
        assert!(det.detect(&img.view()).len() <= 2);
    }
}
