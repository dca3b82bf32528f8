use super::{select_best, DetectParams, RecognitionParams};
use crate::{
    DatabaseError, ImagePreprocessor, MatchResult, ReferenceEntry, TargetDatabase, TargetMatcher,
};
use keypoint_targets_core::{
    DescriptorExtractor, DescriptorMatcher, FeatureDetector, Features, GrayImageView,
    MIN_HOMOGRAPHY_POINTS,
};
use rayon::prelude::*;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Owns the target database and the feature collaborators, and runs greedy
/// multi-instance detection over query images.
///
/// The database is read-only during detection, so one engine can serve
/// concurrent `detect` calls; each call works on its own copy of the query
/// features.
pub struct RecognitionEngine {
    database: TargetDatabase,
    detector: Box<dyn FeatureDetector>,
    extractor: Box<dyn DescriptorExtractor>,
    matcher: Box<dyn DescriptorMatcher>,
    params: RecognitionParams,
}

/// Working state of one `detect` call.
struct DetectionSession {
    working: Features,
    rounds: usize,
    accepted: Vec<MatchResult>,
}

impl RecognitionEngine {
    /// Create an engine with an empty database.
    pub fn new(
        detector: impl FeatureDetector + 'static,
        extractor: impl DescriptorExtractor + 'static,
        matcher: impl DescriptorMatcher + 'static,
        params: RecognitionParams,
    ) -> Self {
        Self {
            database: TargetDatabase::default(),
            detector: Box::new(detector),
            extractor: Box::new(extractor),
            matcher: Box::new(matcher),
            params,
        }
    }

    pub fn with_database(mut self, database: TargetDatabase) -> Self {
        self.database = database;
        self
    }

    /// Build the database from reference entries with this engine's detector
    /// and extractor. On failure the current database is left untouched.
    ///
    /// Returns the number of models built.
    pub fn build_database(
        &mut self,
        entries: &[ReferenceEntry],
        preprocessor: &dyn ImagePreprocessor,
    ) -> Result<usize, DatabaseError> {
        let database = TargetDatabase::build(
            entries,
            preprocessor,
            self.detector.as_ref(),
            self.extractor.as_ref(),
        )?;
        self.database = database;
        Ok(self.database.len())
    }

    #[inline]
    pub fn database(&self) -> &TargetDatabase {
        &self.database
    }

    #[inline]
    pub fn params(&self) -> &RecognitionParams {
        &self.params
    }

    /// Detect and describe query features.
    pub fn extract(&self, image: &GrayImageView<'_>) -> Features {
        let keypoints = self.detector.detect(image);
        self.extractor.compute(image, keypoints)
    }

    /// Detect targets with the engine's own [`DetectParams`].
    pub fn detect(&self, image: &GrayImageView<'_>) -> Vec<MatchResult> {
        self.detect_with(image, &self.params.detect)
    }

    /// Detect targets in `image`. Results are in acceptance order.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, image, params), fields(width = image.width, height = image.height))
    )]
    pub fn detect_with(&self, image: &GrayImageView<'_>, params: &DetectParams) -> Vec<MatchResult> {
        let start = Instant::now();
        let query = self.extract(image);
        let results = self.detect_features(&query, image.area(), params);
        log::debug!(
            "detected {} target(s) from {} query keypoints in {:.1} ms",
            results.len(),
            query.len(),
            start.elapsed().as_secs_f64() * 1e3
        );
        results
    }

    /// Greedy detection over precomputed query features.
    ///
    /// Each round matches every target against the remaining query features,
    /// picks the best gated candidate, and stops unless its score exceeds
    /// `score_threshold`. The winner's inlier query keypoints are removed
    /// whether or not it clears `min_inliers` and is reported.
    pub fn detect_features(
        &self,
        query: &Features,
        image_area: f32,
        params: &DetectParams,
    ) -> Vec<MatchResult> {
        if query.len() < MIN_HOMOGRAPHY_POINTS {
            log::debug!("only {} query keypoints, nothing to fit", query.len());
            return Vec::new();
        }

        let mut session = DetectionSession {
            working: query.clone(),
            rounds: 0,
            accepted: Vec::new(),
        };

        while params.max_rounds.is_none_or(|max| session.rounds < max)
            && session.working.len() >= MIN_HOMOGRAPHY_POINTS
        {
            session.rounds += 1;
            let mut candidates = self.analyze_all(&session.working);
            let Some(best) = select_best(&candidates, image_area, params) else {
                break;
            };
            let winner = candidates.swap_remove(best);
            if winner.score <= params.score_threshold {
                break;
            }

            session.working = session.working.without_indices(&winner.inlier_query_indices());
            if winner.inliers.len() > params.min_inliers {
                log::debug!(
                    "round {}: target {} score {:.3} with {} inliers",
                    session.rounds,
                    winner.target_id,
                    winner.score,
                    winner.inliers.len()
                );
                session.accepted.push(winner);
            } else {
                log::debug!(
                    "round {}: target {} dropped, {} inliers <= {}",
                    session.rounds,
                    winner.target_id,
                    winner.inliers.len(),
                    params.min_inliers
                );
            }
        }

        log::trace!("detection ended after {} round(s)", session.rounds);
        session.accepted
    }

    /// Match every target against `query` in parallel, in database order.
    pub fn analyze_all(&self, query: &Features) -> Vec<MatchResult> {
        let matcher = self.matcher.as_ref();
        let ransac = &self.params.ransac;
        self.database
            .models()
            .par_iter()
            .map(|model| TargetMatcher::new(model, matcher, ransac).analyze(query))
            .collect()
    }
}
