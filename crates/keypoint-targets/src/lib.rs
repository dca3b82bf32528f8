//! High-level facade crate for the `keypoint-targets-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core, feature and recognition crates
//! - an [`AppConfig`] JSON file describing a full recognition setup
//! - (feature `image`) image loading, overlay rendering and end-to-end helpers
//! - (feature `cli`) the `keypoint-targets` binary
//!
//! ## Quickstart
//!
//! ```no_run
//! use keypoint_targets::{detect, orb_engine, recognition, AppConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = AppConfig::default();
//! let mut engine = orb_engine(&cfg);
//! let refs = recognition::load_reference_list(&cfg.reference_list, &cfg.reference_dir)?;
//! engine.build_database(&refs, &detect::ImageLoader::default())?;
//!
//! let img = image::ImageReader::open("query.png")?.decode()?.to_luma8();
//! for m in detect::detect_targets(&engine, &img) {
//!     println!("target {} score {:.2}", m.target_id, m.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `keypoint_targets::core`: keypoints, descriptors, homographies, images.
//! - `keypoint_targets::orb`: FAST corners, oriented BRIEF, Hamming matching.
//! - `keypoint_targets::recognition`: target models, detection, evaluation.
//! - `keypoint_targets::detect` (feature `image`): helpers over `image::GrayImage`.

pub use keypoint_targets_core as core;
pub use keypoint_targets_orb as orb;
pub use keypoint_targets_recognition as recognition;

pub use keypoint_targets_recognition::{
    DetectParams, EvaluationReport, MatchResult, RecognitionEngine, RecognitionParams,
    TargetModel,
};

mod config;

pub use config::{AppConfig, ConfigError};

#[cfg(feature = "image")]
pub mod detect;

/// Engine using the ORB-style pipeline configured in `cfg`, with an empty
/// database.
pub fn orb_engine(cfg: &AppConfig) -> RecognitionEngine {
    RecognitionEngine::new(
        cfg.orb.detector(),
        cfg.orb.extractor(),
        cfg.orb.matcher(),
        cfg.recognition.clone(),
    )
}
