//! Greedy multi-instance detection.
//!
//! Every round evaluates all target models in parallel against the remaining
//! query features, then picks the winner sequentially so the outcome does not
//! depend on thread scheduling.

mod params;
mod pipeline;
mod select;

pub use params::{DetectParams, RecognitionParams};
pub use pipeline::RecognitionEngine;
pub use select::{passes_gates, select_best};
