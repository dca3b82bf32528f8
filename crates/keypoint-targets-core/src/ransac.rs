//! Outlier-robust homography fitting (RANSAC over 4-point samples).

use crate::{estimate_homography, homography_from_4pt, Homography};
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Smallest number of correspondences that determines a homography.
pub const MIN_HOMOGRAPHY_POINTS: usize = 4;

/// RANSAC configuration for homography fitting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Maximum number of sampling iterations.
    pub max_iters: usize,
    /// Inlier threshold (reprojection error in pixels).
    pub reprojection_threshold: f32,
    /// Stop early once this fraction of correspondences are inliers.
    pub early_exit_ratio: f32,
    /// Random seed. A fixed seed keeps fitting a pure function of its inputs.
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            reprojection_threshold: 3.0,
            early_exit_ratio: 0.9,
            seed: 0,
        }
    }
}

/// A successful robust fit.
#[derive(Clone, Debug)]
pub struct RansacFit {
    pub homography: Homography,
    /// `true` for correspondences consistent with `homography`.
    pub inlier_mask: Vec<bool>,
    pub n_inliers: usize,
}

impl RansacFit {
    pub fn inlier_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.inlier_mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
    }
}

fn has_collinear_triple(p: &[Point2<f32>; 4]) -> bool {
    let span = p
        .iter()
        .flat_map(|a| p.iter().map(move |b| (*a - *b).norm()))
        .fold(0.0f32, f32::max) as f64;
    let eps = (span * span * 1e-4).max(1e-9);
    for i in 0..4 {
        for j in (i + 1)..4 {
            for k in (j + 1)..4 {
                let (a, b, c) = (p[i], p[j], p[k]);
                let z = (b.x - a.x) as f64 * (c.y - a.y) as f64
                    - (b.y - a.y) as f64 * (c.x - a.x) as f64;
                if z.abs() <= eps {
                    return true;
                }
            }
        }
    }
    false
}

fn score(h: &Homography, src: &[Point2<f32>], dst: &[Point2<f32>], thr: f32) -> (Vec<bool>, usize) {
    let mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(&s, &d)| h.reprojection_error(s, d) <= thr)
        .collect();
    let count = mask.iter().filter(|&&m| m).count();
    (mask, count)
}

/// Fit `dst ~ H * src` robustly.
///
/// Returns `None` when fewer than [`MIN_HOMOGRAPHY_POINTS`] correspondences
/// are given, or when no non-degenerate model supported by at least
/// [`MIN_HOMOGRAPHY_POINTS`] inliers is found.
pub fn fit_homography_ransac(
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    params: &RansacParams,
) -> Option<RansacFit> {
    let n = src.len();
    if n != dst.len() || n < MIN_HOMOGRAPHY_POINTS {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let thr = params.reprojection_threshold;
    let iters = if n == MIN_HOMOGRAPHY_POINTS {
        1
    } else {
        params.max_iters.max(1)
    };

    let mut best: Option<(Homography, Vec<bool>, usize)> = None;

    for _ in 0..iters {
        let idx = rand::seq::index::sample(&mut rng, n, MIN_HOMOGRAPHY_POINTS);
        let s4 = [src[idx.index(0)], src[idx.index(1)], src[idx.index(2)], src[idx.index(3)]];
        let d4 = [dst[idx.index(0)], dst[idx.index(1)], dst[idx.index(2)], dst[idx.index(3)]];
        if has_collinear_triple(&s4) || has_collinear_triple(&d4) {
            continue;
        }

        let Some(h) = homography_from_4pt(&s4, &d4) else {
            continue;
        };

        let (mask, count) = score(&h, src, dst, thr);
        if best.as_ref().is_none_or(|(_, _, c)| count > *c) {
            best = Some((h, mask, count));
            if count as f32 >= params.early_exit_ratio * n as f32 {
                break;
            }
        }
    }

    let (mut h, mut mask, mut count) = best?;

    // Refit on all inliers; keep the refit only if it does not lose support.
    if count > MIN_HOMOGRAPHY_POINTS {
        let (s_in, d_in): (Vec<_>, Vec<_>) = src
            .iter()
            .zip(dst)
            .zip(&mask)
            .filter_map(|((&s, &d), &m)| m.then_some((s, d)))
            .unzip();
        if let Some(refit) = estimate_homography(&s_in, &d_in) {
            let (refit_mask, refit_count) = score(&refit, src, dst, thr);
            if refit_count >= count {
                h = refit;
                mask = refit_mask;
                count = refit_count;
            }
        }
    }

    if count < MIN_HOMOGRAPHY_POINTS {
        log::trace!("ransac: best model has only {count} inliers");
        return None;
    }

    Some(RansacFit {
        homography: h,
        inlier_mask: mask,
        n_inliers: count,
    })
}
