//! Default feature pipeline for keypoint-targets.
//!
//! - [`FastDetector`]: FAST-9 segment test corners with grid non-maximum
//!   suppression.
//! - [`BriefExtractor`]: 256-bit BRIEF descriptors steered by the
//!   intensity-centroid orientation (the ORB recipe, single scale).
//! - [`HammingMatcher`]: brute-force Hamming matching with an optional
//!   ratio test.
//!
//! All three implement the collaborator traits of `keypoint-targets-core`.

mod brief;
mod fast;
mod matcher;

pub use brief::{BriefExtractor, BriefParams, BRIEF_BYTES};
pub use fast::{FastDetector, FastParams};
pub use matcher::{hamming_distance, HammingMatcher, HammingMatcherParams};

use serde::{Deserialize, Serialize};

/// Combined configuration of the default pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbParams {
    pub fast: FastParams,
    pub brief: BriefParams,
    pub matcher: HammingMatcherParams,
}

impl OrbParams {
    pub fn detector(&self) -> FastDetector {
        FastDetector::new(self.fast.clone())
    }

    pub fn extractor(&self) -> BriefExtractor {
        BriefExtractor::new(self.brief.clone())
    }

    pub fn matcher(&self) -> HammingMatcher {
        HammingMatcher::new(self.matcher.clone())
    }
}
