use super::DetectParams;
use crate::MatchResult;
use std::cmp::Ordering;

/// Geometric acceptance gate for one round's candidate: a fitted transform
/// whose projected contour is a convex polygon covering more than
/// `min_area_fraction` of the image.
pub fn passes_gates(candidate: &MatchResult, image_area: f32, params: &DetectParams) -> bool {
    candidate.is_fitted()
        && image_area > 0.0
        && candidate.contour_area() / image_area > params.min_area_fraction
        && candidate.contour_is_convex()
}

/// Index of the round winner among `candidates`, ignoring the score threshold.
///
/// Only candidates passing [`passes_gates`] compete. Highest score wins; equal
/// scores go to the lowest target id, then to the earliest candidate.
pub fn select_best(candidates: &[MatchResult], image_area: f32, params: &DetectParams) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| passes_gates(c, image_area, params))
        .fold(None, |best: Option<(usize, &MatchResult)>, (i, c)| match best {
            Some((_, b)) if !beats(c, b) => best,
            _ => Some((i, c)),
        })
        .map(|(i, _)| i)
}

fn beats(c: &MatchResult, incumbent: &MatchResult) -> bool {
    match c.score.total_cmp(&incumbent.score) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => c.target_id < incumbent.target_id,
    }
}
