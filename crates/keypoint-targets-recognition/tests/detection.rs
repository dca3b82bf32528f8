mod common;

use approx::assert_relative_eq;
use common::{engine, labels, model, paint};
use keypoint_targets_core::GrayImage;
use keypoint_targets_recognition::{
    DetectParams, MatchStatus, RecognitionParams, TargetDatabase,
};

fn two_target_engine() -> keypoint_targets_recognition::RecognitionEngine {
    let db = TargetDatabase::new(vec![model(1, &labels(1..=50)), model(2, &labels(101..=130))]);
    engine(RecognitionParams::default()).with_database(db)
}

#[test]
fn single_target_scores_inlier_fraction() {
    let engine = two_target_engine();

    let mut query = GrayImage::new(100, 100);
    paint(&mut query, (20, 30), &labels(1..=40));
    // unmatched clutter survives the first round
    for (i, x) in (5..95).step_by(15).enumerate() {
        query.set(x, 92, 200 + i as u8);
    }

    let results = engine.detect(&query.view());
    assert_eq!(results.len(), 1);
    let r = &results[0];
    assert_eq!(r.target_id, 1);
    assert_eq!(r.status, MatchStatus::Fitted);
    assert_eq!(r.inliers.len(), 40);
    assert_relative_eq!(r.score, 0.8, epsilon = 1e-6);
    assert_eq!(r.color, [1, 0, 0]);
    assert_relative_eq!(r.contour[0].x, 20.0, epsilon = 1e-2);
    assert_relative_eq!(r.contour[0].y, 30.0, epsilon = 1e-2);
}

#[test]
fn repeated_target_is_found_twice() {
    let engine = two_target_engine();
    let mut query = GrayImage::new(120, 120);
    paint(&mut query, (2, 2), &labels(1..=50));
    paint(&mut query, (50, 70), &labels(1..=50));

    let results = engine.detect(&query.view());
    let ids: Vec<u32> = results.iter().map(|r| r.target_id).collect();
    assert_eq!(ids, vec![1, 1]);
    // first round claims the copy scanned first
    assert_relative_eq!(results[0].contour[0].y, 2.0, epsilon = 1e-2);
    assert_relative_eq!(results[1].contour[0].y, 70.0, epsilon = 1e-2);
    for r in &results {
        assert_relative_eq!(r.score, 1.0);
    }
}

#[test]
fn round_cap_limits_detections() {
    let engine = two_target_engine();
    let mut query = GrayImage::new(120, 120);
    paint(&mut query, (2, 2), &labels(1..=50));
    paint(&mut query, (50, 70), &labels(1..=50));

    let params = DetectParams {
        max_rounds: Some(1),
        ..DetectParams::default()
    };
    assert_eq!(engine.detect_with(&query.view(), &params).len(), 1);
}

#[test]
fn fewer_than_four_keypoints_yield_nothing() {
    let engine = two_target_engine();
    let mut query = GrayImage::new(50, 50);
    query.set(1, 1, 1);
    query.set(10, 3, 2);
    query.set(4, 20, 3);
    assert!(engine.detect(&query.view()).is_empty());
}

#[test]
fn empty_database_detects_nothing() {
    let engine = engine(RecognitionParams::default());
    let mut query = GrayImage::new(100, 100);
    paint(&mut query, (20, 30), &labels(1..=40));
    assert!(engine.database().is_empty());
    assert!(engine.detect(&query.view()).is_empty());
}

#[test]
fn detection_is_repeatable() {
    let engine = two_target_engine();
    let mut query = GrayImage::new(120, 120);
    paint(&mut query, (2, 2), &labels(1..=50));
    paint(&mut query, (60, 60), &labels(101..=130));

    let first = engine.detect(&query.view());
    let second = engine.detect(&query.view());
    let summary = |rs: &[keypoint_targets_recognition::MatchResult]| {
        rs.iter()
            .map(|r| (r.target_id, r.inliers.len(), r.score))
            .collect::<Vec<_>>()
    };
    assert_eq!(first.len(), 2);
    assert_eq!(summary(&first), summary(&second));
}

#[test]
fn weakly_supported_winner_is_consumed_but_not_reported() {
    let db = TargetDatabase::new(vec![model(9, &labels(1..=6))]);
    let engine = engine(RecognitionParams::default()).with_database(db);
    let mut query = GrayImage::new(70, 20);
    paint(&mut query, (2, 2), &labels(1..=6));
    paint(&mut query, (2, 12), &labels(1..=6));

    // both instances score 1.0 but carry only 6 <= 8 inliers
    assert!(engine.detect(&query.view()).is_empty());

    let lenient = DetectParams {
        min_inliers: 5,
        min_area_fraction: 0.0,
        ..DetectParams::default()
    };
    assert_eq!(engine.detect_with(&query.view(), &lenient).len(), 2);
}

#[test]
fn equal_scores_go_to_lowest_id() {
    let db = TargetDatabase::new(vec![model(7, &labels(1..=20)), model(3, &labels(1..=20))]);
    let engine = engine(RecognitionParams::default()).with_database(db);
    let mut query = GrayImage::new(80, 30);
    paint(&mut query, (5, 5), &labels(1..=20));

    let results = engine.detect(&query.view());
    let ids: Vec<u32> = results.iter().map(|r| r.target_id).collect();
    assert_eq!(ids, vec![3]);
}

#[test]
fn small_contours_are_gated_out() {
    let engine = two_target_engine();
    let mut query = GrayImage::new(400, 400);
    paint(&mut query, (20, 30), &labels(1..=50));
    // target covers ~57x29 px of 400x400, about 1 %
    assert!(engine.detect(&query.view()).is_empty());

    let params = DetectParams {
        min_area_fraction: 0.005,
        ..DetectParams::default()
    };
    assert_eq!(engine.detect_with(&query.view(), &params).len(), 1);
}

fn two_copies() -> GrayImage {
    let mut query = GrayImage::new(120, 120);
    paint(&mut query, (2, 2), &labels(1..=50));
    paint(&mut query, (50, 70), &labels(1..=50));
    // partial view of target 2, clear of both copies
    paint(&mut query, (2, 40), &labels(101..=112));
    query
}

#[test]
fn candidate_scores_and_inliers_stay_bounded() {
    let engine = two_target_engine();
    let mut working = engine.extract(&two_copies().view());

    while working.len() >= 4 {
        let candidates = engine.analyze_all(&working);
        assert_eq!(candidates.len(), engine.database().len());
        for (r, m) in candidates.iter().zip(engine.database().models()) {
            assert!((0.0..=1.0).contains(&r.score), "score {}", r.score);
            assert!(r.inliers.len() <= m.len());
            assert!(r.inliers.len() <= working.len());
            assert_eq!(r.inlier_points.len(), r.inliers.len());
            assert_eq!(r.target_points.len(), r.inliers.len());
        }
        let Some(best) = candidates
            .iter()
            .filter(|r| r.is_fitted())
            .max_by(|a, b| a.score.total_cmp(&b.score))
        else {
            break;
        };
        working = working.without_indices(&best.inlier_query_indices());
    }
}

#[test]
fn every_round_consumes_the_winners_inliers() {
    let engine = two_target_engine();
    let query = engine.extract(&two_copies().view());
    let area = 120.0 * 120.0;
    let uncapped = engine.detect_features(&query, area, &DetectParams::default());
    assert_eq!(uncapped.len(), 3);

    let mut working = query.clone();
    for (k, winner) in uncapped.iter().enumerate() {
        // the k-th winner is the best candidate on what earlier rounds left
        let best = engine
            .analyze_all(&working)
            .into_iter()
            .filter(|r| r.is_fitted())
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .expect("candidate");
        assert_eq!(best.target_id, winner.target_id);
        assert_eq!(best.inliers.len(), winner.inliers.len());

        let next = working.without_indices(&winner.inlier_query_indices());
        assert!(!winner.inliers.is_empty());
        assert_eq!(next.len(), working.len() - winner.inliers.len());
        working = next;

        let capped = DetectParams {
            max_rounds: Some(k + 1),
            ..DetectParams::default()
        };
        let prefix = engine.detect_features(&query, area, &capped);
        assert_eq!(prefix.len(), k + 1);
        let ids: Vec<u32> = prefix.iter().map(|r| r.target_id).collect();
        let expected: Vec<u32> = uncapped[..=k].iter().map(|r| r.target_id).collect();
        assert_eq!(ids, expected);
    }
    assert!(working.is_empty());
}
