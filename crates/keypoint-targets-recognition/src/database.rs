//! Reference target database and its parallel construction.

use crate::{DatabaseError, LoadError, TargetModel};
use keypoint_targets_core::{DescriptorExtractor, FeatureDetector, GrayImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// How an image file should be turned into a grayscale buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    /// Luminance image used for feature extraction.
    Gray,
    /// Region-of-interest mask; foreground pixels are non-zero.
    Mask,
}

/// Loads (and optionally cleans up) images for the recognition pipeline.
pub trait ImagePreprocessor: Send + Sync {
    fn load(&self, path: &Path, mode: LoadMode) -> Result<GrayImage, LoadError>;
}

/// One line of the reference list, resolved to file paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub image_path: PathBuf,
    pub mask_path: PathBuf,
    pub id: u32,
    /// Display color, RGB.
    pub color: [u8; 3],
}

/// Immutable collection of target models, in reference-list order.
#[derive(Clone, Debug, Default)]
pub struct TargetDatabase {
    models: Vec<TargetModel>,
}

impl TargetDatabase {
    pub fn new(models: Vec<TargetModel>) -> Self {
        Self { models }
    }

    /// Build one model per reference entry, in parallel.
    ///
    /// Entries whose image or mask fails to load are logged and skipped.
    /// Fails only when no model at all could be built.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(entries = entries.len()))
    )]
    pub fn build(
        entries: &[ReferenceEntry],
        preprocessor: &dyn ImagePreprocessor,
        detector: &dyn FeatureDetector,
        extractor: &dyn DescriptorExtractor,
    ) -> Result<Self, DatabaseError> {
        let start = Instant::now();
        let models: Vec<TargetModel> = entries
            .par_iter()
            .filter_map(|entry| {
                match build_model(entry, preprocessor, detector, extractor) {
                    Ok(model) => Some(model),
                    Err(err) => {
                        log::warn!(
                            "skipping reference {} (id {}): {err}",
                            entry.image_path.display(),
                            entry.id
                        );
                        None
                    }
                }
            })
            .collect();

        log::info!(
            "built {}/{} target models in {:.1} ms",
            models.len(),
            entries.len(),
            start.elapsed().as_secs_f64() * 1e3
        );
        if models.is_empty() {
            return Err(DatabaseError::NoTargets);
        }
        Ok(Self { models })
    }

    #[inline]
    pub fn models(&self) -> &[TargetModel] {
        &self.models
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn build_model(
    entry: &ReferenceEntry,
    preprocessor: &dyn ImagePreprocessor,
    detector: &dyn FeatureDetector,
    extractor: &dyn DescriptorExtractor,
) -> Result<TargetModel, LoadError> {
    let image = preprocessor.load(&entry.image_path, LoadMode::Gray)?;
    let mask = preprocessor.load(&entry.mask_path, LoadMode::Mask)?;
    let model = TargetModel::build(
        &image.view(),
        &mask.view(),
        entry.id,
        entry.color,
        detector,
        extractor,
    )?;
    Ok(model.with_source(&entry.image_path))
}
