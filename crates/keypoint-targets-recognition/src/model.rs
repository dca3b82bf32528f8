//! Per-target recognition models built from a reference image and its mask.

use crate::LoadError;
use keypoint_targets_core::{
    bounding_rect, DescriptorExtractor, FeatureDetector, Features, GrayImageView,
};
use nalgebra::Point2;
use std::path::{Path, PathBuf};

/// One reference target: its identity, display color, the features found
/// inside its region of interest, and the ROI outline in reference pixels.
///
/// Immutable once built.
#[derive(Clone, Debug)]
pub struct TargetModel {
    id: u32,
    color: [u8; 3],
    features: Features,
    outline: Vec<Point2<f32>>,
    source: Option<PathBuf>,
}

impl TargetModel {
    /// Detect and describe features over the whole reference image, then keep
    /// the ones whose (rounded) position falls on a non-zero mask pixel.
    ///
    /// The outline is the tight bounding rectangle of the mask foreground, or
    /// the full frame if the mask is empty.
    pub fn build(
        image: &GrayImageView<'_>,
        mask: &GrayImageView<'_>,
        id: u32,
        color: [u8; 3],
        detector: &dyn FeatureDetector,
        extractor: &dyn DescriptorExtractor,
    ) -> Result<Self, LoadError> {
        if !image.same_size(mask) {
            return Err(LoadError::DimensionMismatch {
                width: image.width,
                height: image.height,
                mask_width: mask.width,
                mask_height: mask.height,
            });
        }

        let keypoints = detector.detect(image);
        let all = extractor.compute(image, keypoints);
        let features = all.retain(|_, kp| {
            mask.get(kp.position.x.round() as i32, kp.position.y.round() as i32) != 0
        });
        log::debug!(
            "target {id}: kept {}/{} keypoints inside the mask",
            features.len(),
            all.len()
        );

        let outline = mask_outline(mask);
        Ok(Self {
            id,
            color,
            features,
            outline,
            source: None,
        })
    }

    /// Wrap precomputed features. The outline defaults to the bounding
    /// rectangle of the keypoints.
    pub fn from_features(id: u32, color: [u8; 3], features: Features) -> Self {
        let positions: Vec<Point2<f32>> = features.keypoints().iter().map(|k| k.position).collect();
        let outline = bounding_rect(&positions)
            .map(|[x0, y0, x1, y1]| rect_outline(x0, y0, x1, y1))
            .unwrap_or_default();
        Self {
            id,
            color,
            features,
            outline,
            source: None,
        }
    }

    pub fn with_outline(mut self, outline: Vec<Point2<f32>>) -> Self {
        self.outline = outline;
        self
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    #[inline]
    pub fn features(&self) -> &Features {
        &self.features
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// ROI boundary in reference-image pixels.
    #[inline]
    pub fn outline(&self) -> &[Point2<f32>] {
        &self.outline
    }

    /// Reference image this model was built from, if known.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn rect_outline(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Point2<f32>> {
    vec![
        Point2::new(x0, y0),
        Point2::new(x1, y0),
        Point2::new(x1, y1),
        Point2::new(x0, y1),
    ]
}

/// Pixel-edge bounding rectangle of the non-zero mask pixels.
fn mask_outline(mask: &GrayImageView<'_>) -> Vec<Point2<f32>> {
    let mut bounds: Option<[usize; 4]> = None;
    for (y, row) in mask.data.chunks_exact(mask.width.max(1)).enumerate() {
        for (x, &v) in row.iter().enumerate() {
            if v == 0 {
                continue;
            }
            let b = bounds.get_or_insert([x, y, x, y]);
            b[0] = b[0].min(x);
            b[1] = b[1].min(y);
            b[2] = b[2].max(x);
            b[3] = b[3].max(y);
        }
    }
    match bounds {
        Some([x0, y0, x1, y1]) => {
            rect_outline(x0 as f32, y0 as f32, (x1 + 1) as f32, (y1 + 1) as f32)
        }
        None => rect_outline(0.0, 0.0, mask.width as f32, mask.height as f32),
    }
}
