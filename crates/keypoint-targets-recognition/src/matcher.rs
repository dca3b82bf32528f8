//! Matching one target model against a query feature set.

use crate::{MatchResult, MatchStatus, TargetModel};
use keypoint_targets_core::{
    fit_homography_ransac, Correspondence, DescriptorMatcher, Features, RansacParams,
    MIN_HOMOGRAPHY_POINTS,
};
use nalgebra::Point2;

/// Correspondence search, robust homography fit and contour projection for a
/// single [`TargetModel`].
///
/// `analyze` is a pure function of the query and the borrowed model, so many
/// matchers can run concurrently over the same query features.
#[derive(Clone, Copy)]
pub struct TargetMatcher<'a> {
    model: &'a TargetModel,
    matcher: &'a dyn DescriptorMatcher,
    ransac: &'a RansacParams,
}

impl<'a> TargetMatcher<'a> {
    pub fn new(
        model: &'a TargetModel,
        matcher: &'a dyn DescriptorMatcher,
        ransac: &'a RansacParams,
    ) -> Self {
        Self {
            model,
            matcher,
            ransac,
        }
    }

    #[inline]
    pub fn model(&self) -> &TargetModel {
        self.model
    }

    pub fn analyze(&self, query: &Features) -> MatchResult {
        let model = self.model;
        let unfitted = |status| MatchResult::unfitted(model, status);

        if model.len() < MIN_HOMOGRAPHY_POINTS || query.len() < MIN_HOMOGRAPHY_POINTS {
            return unfitted(MatchStatus::InsufficientFeatures);
        }

        let raw = self
            .matcher
            .match_descriptors(model.features().descriptors(), query.descriptors());
        let matches = one_to_one(&raw, model.len(), query.len());
        if matches.len() < MIN_HOMOGRAPHY_POINTS {
            return unfitted(MatchStatus::InsufficientFeatures);
        }

        let src: Vec<Point2<f32>> = matches
            .iter()
            .map(|c| model.features().keypoints()[c.target].position)
            .collect();
        let dst: Vec<Point2<f32>> = matches
            .iter()
            .map(|c| query.keypoints()[c.query].position)
            .collect();

        let Some(fit) = fit_homography_ransac(&src, &dst, self.ransac) else {
            return unfitted(MatchStatus::DegenerateTransform);
        };
        let Some(contour) = model
            .outline()
            .iter()
            .map(|&p| fit.homography.try_apply(p))
            .collect::<Option<Vec<_>>>()
        else {
            return unfitted(MatchStatus::DegenerateTransform);
        };

        let inliers: Vec<Correspondence> = fit.inlier_indices().map(|i| matches[i]).collect();
        let inlier_points = fit.inlier_indices().map(|i| dst[i]).collect();
        let target_points = fit.inlier_indices().map(|i| src[i]).collect();
        let score = (inliers.len() as f32 / model.len() as f32).min(1.0);

        MatchResult {
            target_id: model.id(),
            score,
            inliers,
            inlier_points,
            target_points,
            contour,
            color: model.color(),
            homography: Some(fit.homography),
            status: MatchStatus::Fitted,
            reference: model.source().map(|p| p.to_path_buf()),
        }
    }
}

/// Reduce raw `(target, query, distance)` matches to a one-to-one set.
///
/// Closer matches claim their query and target keypoints first; out-of-range
/// indices are dropped. The result is ordered by target index.
fn one_to_one(raw: &[(usize, usize, f32)], n_target: usize, n_query: usize) -> Vec<Correspondence> {
    let mut order: Vec<&(usize, usize, f32)> = raw
        .iter()
        .filter(|(t, q, d)| *t < n_target && *q < n_query && !d.is_nan())
        .collect();
    order.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut target_used = vec![false; n_target];
    let mut query_used = vec![false; n_query];
    let mut out = Vec::new();
    for &&(target, query, distance) in &order {
        if target_used[target] || query_used[query] {
            continue;
        }
        target_used[target] = true;
        query_used[query] = true;
        out.push(Correspondence {
            query,
            target,
            distance,
        });
    }
    out.sort_by_key(|c| c.target);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use keypoint_targets_core::{Descriptors, Keypoint};

    /// Exact-equality matcher: target row -> first identical query row.
    struct ExactMatcher;

    impl DescriptorMatcher for ExactMatcher {
        fn match_descriptors(
            &self,
            from: &Descriptors,
            to: &Descriptors,
        ) -> Vec<(usize, usize, f32)> {
            from.iter()
                .enumerate()
                .filter_map(|(i, r)| to.iter().position(|t| t == r).map(|j| (i, j, 0.0)))
                .collect()
        }
    }

    fn features(points: &[(f32, f32, u16)]) -> Features {
        let kps = points.iter().map(|&(x, y, _)| Keypoint::at(x, y)).collect();
        let rows: Vec<[u8; 2]> = points.iter().map(|p| p.2.to_le_bytes()).collect();
        Features::new(kps, Descriptors::from_rows(2, &rows).expect("rows")).expect("features")
    }

    fn grid(n: usize, label0: u16) -> Vec<(f32, f32, u16)> {
        (0..n)
            .map(|i| ((i % 5) as f32 * 10.0, (i / 5) as f32 * 7.0 + (i % 3) as f32, label0 + i as u16))
            .collect()
    }

    #[test]
    fn translated_target_is_fitted() {
        let target = grid(20, 0);
        let model = TargetModel::from_features(3, [9, 9, 9], features(&target));
        let query: Vec<_> = target[..15]
            .iter()
            .map(|&(x, y, l)| (x + 100.0, y + 50.0, l))
            .collect();
        let ransac = RansacParams::default();
        let r = TargetMatcher::new(&model, &ExactMatcher, &ransac).analyze(&features(&query));

        assert_eq!(r.status, MatchStatus::Fitted);
        assert_eq!(r.inliers.len(), 15);
        assert_relative_eq!(r.score, 0.75);
        assert_eq!(r.contour.len(), 4);
        assert_relative_eq!(r.contour[0].x, 100.0, epsilon = 1e-2);
        assert_relative_eq!(r.contour[0].y, 50.0, epsilon = 1e-2);
        assert_eq!(r.inlier_points.len(), r.inliers.len());
        assert_eq!(r.target_points.len(), r.inliers.len());
        for (t, q) in r.target_points.iter().zip(&r.inlier_points) {
            assert_relative_eq!(q.x - t.x, 100.0, epsilon = 1e-3);
            assert_relative_eq!(q.y - t.y, 50.0, epsilon = 1e-3);
        }
        assert!(r.reference.is_none());
    }

    #[test]
    fn too_few_matches_is_insufficient() {
        let target = grid(10, 0);
        let model = TargetModel::from_features(1, [0; 3], features(&target));
        let query: Vec<_> = grid(10, 500);
        let ransac = RansacParams::default();
        let r = TargetMatcher::new(&model, &ExactMatcher, &ransac).analyze(&features(&query));
        assert_eq!(r.status, MatchStatus::InsufficientFeatures);
        assert_eq!(r.score, 0.0);
        assert!(r.contour.is_empty());
    }

    #[test]
    fn collinear_matches_are_degenerate() {
        let target: Vec<_> = (0..8).map(|i| (i as f32 * 3.0, 0.0, i as u16)).collect();
        let model = TargetModel::from_features(1, [0; 3], features(&target));
        let ransac = RansacParams::default();
        let r = TargetMatcher::new(&model, &ExactMatcher, &ransac).analyze(&features(&target));
        assert_eq!(r.status, MatchStatus::DegenerateTransform);
        assert!(r.inliers.is_empty());
    }

    #[test]
    fn duplicate_query_claims_are_resolved_one_to_one() {
        let raw = vec![(0, 4, 2.0), (1, 4, 1.0), (2, 5, 3.0), (2, 6, 0.5), (9, 0, 0.0)];
        let out = one_to_one(&raw, 3, 7);
        let pairs: Vec<(usize, usize)> = out.iter().map(|c| (c.target, c.query)).collect();
        assert_eq!(pairs, vec![(1, 4), (2, 6)]);
    }
}
