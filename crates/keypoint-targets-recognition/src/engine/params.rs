use keypoint_targets_core::RansacParams;
use serde::{Deserialize, Serialize};

/// Acceptance gates of the greedy detection loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectParams {
    /// A round's best candidate must score strictly above this to continue.
    pub score_threshold: f32,
    /// A winner is reported only with strictly more inliers than this.
    ///
    /// Winners below it still have their inliers removed.
    pub min_inliers: usize,
    /// Projected contour area over image area must exceed this.
    pub min_area_fraction: f32,
    /// Optional cap on the number of rounds per call.
    pub max_rounds: Option<usize>,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            score_threshold: 0.07,
            min_inliers: 8,
            min_area_fraction: 0.05,
            max_rounds: None,
        }
    }
}

/// Full configuration of a [`RecognitionEngine`](crate::RecognitionEngine).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionParams {
    pub detect: DetectParams,
    /// Robust homography fit used by every target matcher.
    pub ransac: RansacParams,
}
