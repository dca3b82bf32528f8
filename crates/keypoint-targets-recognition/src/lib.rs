//! Keypoint-based recognition of known planar targets.
//!
//! - [`TargetModel`]: features inside a reference image's mask, plus the
//!   target id, display color and ROI outline.
//! - [`TargetMatcher`]: descriptor matching, RANSAC homography and contour
//!   projection for one model.
//! - [`RecognitionEngine`]: owns the [`TargetDatabase`] and runs the greedy
//!   multi-instance detection loop.
//! - [`EvaluationHarness`]: precision / recall / accuracy over a labelled
//!   test list, with a JSON report.
//!
//! Feature detection, description and matching are pluggable through the
//! traits of `keypoint-targets-core`; image decoding through
//! [`ImagePreprocessor`].

mod database;
mod engine;
mod error;
mod evaluation;
mod lists;
mod matcher;
mod model;
mod result;

pub use database::{ImagePreprocessor, LoadMode, ReferenceEntry, TargetDatabase};
pub use engine::{passes_gates, select_best, DetectParams, RecognitionEngine, RecognitionParams};
pub use error::{DatabaseError, EvaluationError, ListError, LoadError};
pub use evaluation::{
    score_detections, summarize, DetectionRenderer, EvaluationHarness, EvaluationOptions,
    EvaluationRecord, EvaluationReport, EvaluationSummary, Metrics,
};
pub use lists::{
    load_reference_list, load_test_list, mask_path_for, parse_reference_line,
    parse_reference_list, parse_test_line, parse_test_list, TestEntry, MASK_SUFFIX,
};
pub use matcher::TargetMatcher;
pub use model::TargetModel;
pub use result::{MatchResult, MatchStatus};

pub use keypoint_targets_core::{Correspondence, Features, Homography, Keypoint, RansacParams};
