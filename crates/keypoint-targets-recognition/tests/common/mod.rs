//! Deterministic collaborators for recognition tests.
//!
//! Images are "label maps": every non-zero pixel is a keypoint whose
//! one-byte descriptor is the pixel value, and descriptors match only when
//! identical. That makes inlier counts exact.

#![allow(dead_code)]

use keypoint_targets_core::{
    DescriptorExtractor, DescriptorMatcher, Descriptors, FeatureDetector, Features, GrayImage,
    GrayImageView, Keypoint,
};
use keypoint_targets_recognition::{
    ImagePreprocessor, LoadError, LoadMode, RecognitionEngine, RecognitionParams, TargetModel,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct LabelDetector;

impl FeatureDetector for LabelDetector {
    fn detect(&self, image: &GrayImageView<'_>) -> Vec<Keypoint> {
        let mut out = Vec::new();
        for y in 0..image.height {
            for x in 0..image.width {
                if image.data[y * image.width + x] != 0 {
                    out.push(Keypoint::at(x as f32, y as f32));
                }
            }
        }
        out
    }
}

pub struct LabelExtractor;

impl DescriptorExtractor for LabelExtractor {
    fn compute(&self, image: &GrayImageView<'_>, keypoints: Vec<Keypoint>) -> Features {
        let rows: Vec<[u8; 1]> = keypoints
            .iter()
            .map(|k| [image.get(k.position.x as i32, k.position.y as i32)])
            .collect();
        Features::new(keypoints, Descriptors::from_rows(1, &rows).expect("rows"))
            .expect("features")
    }
}

/// Each `from` row matches the first identical `to` row.
pub struct ExactMatcher;

impl DescriptorMatcher for ExactMatcher {
    fn match_descriptors(&self, from: &Descriptors, to: &Descriptors) -> Vec<(usize, usize, f32)> {
        from.iter()
            .enumerate()
            .filter_map(|(i, r)| to.iter().position(|t| t == r).map(|j| (i, j, 0.0)))
            .collect()
    }
}

pub fn engine(params: RecognitionParams) -> RecognitionEngine {
    RecognitionEngine::new(LabelDetector, LabelExtractor, ExactMatcher, params)
}

/// `n` distinct, non-collinear positions on a jittered 10-column grid
/// spanning roughly 57 x 6*(n/10) pixels.
pub fn layout(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .map(|i| ((i % 10) * 6 + i % 3, (i / 10) * 6 + i % 4))
        .collect()
}

/// Paint `labels` over the `layout` positions, shifted by `offset`.
pub fn paint(img: &mut GrayImage, offset: (usize, usize), labels: &[u8]) {
    for (&(x, y), &label) in layout(labels.len()).iter().zip(labels) {
        img.set(x + offset.0, y + offset.1, label);
    }
}

pub fn labels(range: std::ops::RangeInclusive<u8>) -> Vec<u8> {
    range.collect()
}

/// Model whose keypoints are the `layout` positions carrying `labels`.
pub fn model(id: u32, labels: &[u8]) -> TargetModel {
    let mut img = GrayImage::new(64, 64);
    paint(&mut img, (0, 0), labels);
    let view = img.view();
    let features = LabelExtractor.compute(&view, LabelDetector.detect(&view));
    TargetModel::from_features(id, [id as u8, 0, 0], features)
}

/// In-memory image store keyed by path.
#[derive(Default)]
pub struct MemoryImages {
    pub images: HashMap<PathBuf, GrayImage>,
}

impl MemoryImages {
    pub fn insert(&mut self, path: impl Into<PathBuf>, image: GrayImage) {
        self.images.insert(path.into(), image);
    }
}

impl ImagePreprocessor for MemoryImages {
    fn load(&self, path: &Path, _mode: LoadMode) -> Result<GrayImage, LoadError> {
        self.images.get(path).cloned().ok_or_else(|| LoadError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not in store"),
        })
    }
}
