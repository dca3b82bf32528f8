use keypoint_targets_core::{DescriptorMatcher, Descriptors};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Number of differing bits between two equal-length byte strings.
#[inline]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Brute-force matcher settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HammingMatcherParams {
    /// Matches farther than this many bits are dropped.
    pub max_distance: u32,
    /// Lowe ratio test: keep a match only if `best < ratio * second_best`.
    pub ratio: Option<f32>,
}

impl Default for HammingMatcherParams {
    fn default() -> Self {
        Self {
            max_distance: 64,
            ratio: Some(0.8),
        }
    }
}

/// Exhaustive nearest-neighbour search over binary descriptors.
#[derive(Clone, Debug, Default)]
pub struct HammingMatcher {
    params: HammingMatcherParams,
}

impl HammingMatcher {
    pub fn new(params: HammingMatcherParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &HammingMatcherParams {
        &self.params
    }

    fn best_match(&self, row: &[u8], to: &Descriptors) -> Option<(usize, u32)> {
        let mut best: Option<(usize, u32)> = None;
        let mut second = u32::MAX;
        for (j, cand) in to.iter().enumerate() {
            let d = hamming_distance(row, cand);
            match best {
                Some((_, bd)) if d >= bd => second = second.min(d),
                Some((_, bd)) => {
                    second = bd;
                    best = Some((j, d));
                }
                None => best = Some((j, d)),
            }
        }

        let (j, d) = best?;
        if d > self.params.max_distance {
            return None;
        }
        if let Some(ratio) = self.params.ratio {
            if second != u32::MAX && d as f32 >= ratio * second as f32 {
                return None;
            }
        }
        Some((j, d))
    }
}

impl DescriptorMatcher for HammingMatcher {
    fn match_descriptors(&self, from: &Descriptors, to: &Descriptors) -> Vec<(usize, usize, f32)> {
        if from.width() != to.width() || to.rows() == 0 {
            return Vec::new();
        }
        (0..from.rows())
            .into_par_iter()
            .filter_map(|i| {
                self.best_match(from.row(i), to)
                    .map(|(j, d)| (i, j, d as f32))
            })
            .collect()
    }
}
