use crate::TargetModel;
use keypoint_targets_core::{is_convex_polygon, polygon_area, Correspondence, Homography};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How far a single target match got.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// A homography was fitted; `contour` and `inliers` are meaningful.
    Fitted,
    /// Query or target had fewer than four usable keypoints/correspondences.
    InsufficientFeatures,
    /// Enough correspondences, but no consistent homography.
    DegenerateTransform,
}

/// Outcome of matching one target model against one query feature set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchResult {
    pub target_id: u32,
    /// Inliers over target keypoints, in `[0, 1]`.
    pub score: f32,
    /// Correspondences consistent with `homography`. Query indices refer to
    /// the feature set passed to the matcher.
    pub inliers: Vec<Correspondence>,
    /// Query-image positions of the inlier keypoints, parallel to `inliers`.
    pub inlier_points: Vec<Point2<f32>>,
    /// Reference-image positions of the inlier keypoints, parallel to `inliers`.
    #[serde(default)]
    pub target_points: Vec<Point2<f32>>,
    /// Target outline projected into the query image; empty unless fitted.
    pub contour: Vec<Point2<f32>>,
    pub color: [u8; 3],
    pub homography: Option<Homography>,
    pub status: MatchStatus,
    /// Reference image the target model was built from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<PathBuf>,
}

impl MatchResult {
    pub(crate) fn unfitted(model: &TargetModel, status: MatchStatus) -> Self {
        Self {
            target_id: model.id(),
            score: 0.0,
            inliers: Vec::new(),
            inlier_points: Vec::new(),
            target_points: Vec::new(),
            contour: Vec::new(),
            color: model.color(),
            homography: None,
            status,
            reference: model.source().map(|p| p.to_path_buf()),
        }
    }

    #[inline]
    pub fn is_fitted(&self) -> bool {
        self.status == MatchStatus::Fitted
    }

    /// Query indices of the inliers.
    pub fn inlier_query_indices(&self) -> Vec<usize> {
        self.inliers.iter().map(|c| c.query).collect()
    }

    pub fn contour_area(&self) -> f32 {
        polygon_area(&self.contour)
    }

    pub fn contour_is_convex(&self) -> bool {
        is_convex_polygon(&self.contour)
    }
}
