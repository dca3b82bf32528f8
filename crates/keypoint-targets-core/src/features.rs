//! Keypoints, descriptors and the detector/extractor/matcher seams.

use crate::GrayImageView;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A distinguishing image location produced by a feature detector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Position in pixels (+x right, +y down).
    pub position: Point2<f32>,
    /// Diameter of the meaningful neighbourhood, in pixels.
    pub size: f32,
    /// Orientation in radians.
    pub angle: f32,
    /// Detector response; larger is stronger.
    pub response: f32,
    /// Pyramid level the keypoint was found on.
    pub octave: u32,
}

impl Keypoint {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            size: 7.0,
            angle: 0.0,
            response: 0.0,
            octave: 0,
        }
    }
}

/// Row-major descriptor matrix: one fixed-width byte row per keypoint.
///
/// The interpretation of the bytes (packed bits, quantized floats, ...) is
/// left to the [`DescriptorMatcher`] in use.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptors {
    width: usize,
    data: Vec<u8>,
}

impl Descriptors {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            data: Vec::new(),
        }
    }

    /// Build from a flat buffer. Returns `None` when the buffer is not a
    /// whole number of rows.
    pub fn from_raw(width: usize, data: Vec<u8>) -> Option<Self> {
        if width == 0 {
            return data.is_empty().then_some(Self { width, data });
        }
        (data.len() % width == 0).then_some(Self { width, data })
    }

    pub fn from_rows<R: AsRef<[u8]>>(width: usize, rows: &[R]) -> Option<Self> {
        let mut out = Self::new(width);
        for r in rows {
            if r.as_ref().len() != width {
                return None;
            }
            out.data.extend_from_slice(r.as_ref());
        }
        Some(out)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn rows(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[u8] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.rows()).map(move |i| self.row(i))
    }

    pub fn push_row(&mut self, row: &[u8]) {
        debug_assert_eq!(row.len(), self.width);
        self.data.extend_from_slice(row);
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }
}

/// Keypoints with their descriptors, kept in lockstep.
///
/// Invariant: `keypoints.len() == descriptors.rows()`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    keypoints: Vec<Keypoint>,
    descriptors: Descriptors,
}

impl Features {
    /// Pair keypoints with descriptors. Returns `None` on a count mismatch.
    pub fn new(keypoints: Vec<Keypoint>, descriptors: Descriptors) -> Option<Self> {
        (keypoints.len() == descriptors.rows()).then_some(Self {
            keypoints,
            descriptors,
        })
    }

    pub fn empty(descriptor_width: usize) -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: Descriptors::new(descriptor_width),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    #[inline]
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    #[inline]
    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    /// Keep the entries for which `keep(index, keypoint)` holds, preserving order.
    pub fn retain<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(usize, &Keypoint) -> bool,
    {
        let mut keypoints = Vec::new();
        let mut descriptors = Descriptors::new(self.descriptors.width());
        for (i, kp) in self.keypoints.iter().enumerate() {
            if keep(i, kp) {
                keypoints.push(*kp);
                descriptors.push_row(self.descriptors.row(i));
            }
        }
        Self {
            keypoints,
            descriptors,
        }
    }

    /// Drop the entries at `indices` (out-of-range and repeated indices are ignored).
    pub fn without_indices(&self, indices: &[usize]) -> Self {
        let mut drop = vec![false; self.len()];
        for &i in indices {
            if let Some(slot) = drop.get_mut(i) {
                *slot = true;
            }
        }
        self.retain(|i, _| !drop[i])
    }
}

/// A proposed pairing of one query keypoint with one target keypoint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    /// Index into the query features.
    pub query: usize,
    /// Index into the target features.
    pub target: usize,
    /// Descriptor distance reported by the matcher.
    pub distance: f32,
}

/// Finds keypoints in a grayscale image.
pub trait FeatureDetector: Send + Sync {
    fn detect(&self, image: &GrayImageView<'_>) -> Vec<Keypoint>;
}

/// Computes one descriptor per keypoint.
///
/// Implementations may drop keypoints they cannot describe (e.g. too close to
/// the border); the returned [`Features`] holds only the described ones, in
/// their original relative order.
pub trait DescriptorExtractor: Send + Sync {
    fn compute(&self, image: &GrayImageView<'_>, keypoints: Vec<Keypoint>) -> Features;
}

/// Proposes correspondences between two descriptor sets.
pub trait DescriptorMatcher: Send + Sync {
    /// For each row of `from`, find its match among the rows of `to`.
    ///
    /// Returns `(from_index, to_index, distance)` triples; rows without an
    /// acceptable match are omitted.
    fn match_descriptors(&self, from: &Descriptors, to: &Descriptors) -> Vec<(usize, usize, f32)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(n: usize) -> Features {
        let kps = (0..n).map(|i| Keypoint::at(i as f32, 0.0)).collect();
        let rows: Vec<[u8; 2]> = (0..n).map(|i| [i as u8, 0]).collect();
        Features::new(kps, Descriptors::from_rows(2, &rows).expect("rows")).expect("features")
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let d = Descriptors::from_raw(2, vec![0; 4]).expect("raw");
        assert!(Features::new(vec![Keypoint::at(0.0, 0.0)], d).is_none());
        assert!(Descriptors::from_raw(3, vec![0; 4]).is_none());
    }

    #[test]
    fn without_indices_preserves_order_and_pairing() {
        let f = features(6);
        let reduced = f.without_indices(&[4, 1, 1, 99]);
        assert_eq!(reduced.len(), 4);
        let xs: Vec<f32> = reduced.keypoints().iter().map(|k| k.position.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 3.0, 5.0]);
        let first_bytes: Vec<u8> = reduced.descriptors().iter().map(|r| r[0]).collect();
        assert_eq!(first_bytes, vec![0, 2, 3, 5]);
    }
}
