//! Core types and utilities for keypoint-based target recognition.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete keypoint detector, descriptor or image type:
//! detectors plug in through the [`FeatureDetector`], [`DescriptorExtractor`]
//! and [`DescriptorMatcher`] traits.

mod features;
mod homography;
mod image;
mod logger;
mod polygon;
mod ransac;

pub use features::{
    Correspondence, DescriptorExtractor, DescriptorMatcher, Descriptors, FeatureDetector,
    Features, Keypoint,
};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{GrayImage, GrayImageView};
pub use polygon::{bounding_rect, is_convex_polygon, polygon_area};
pub use ransac::{fit_homography_ransac, RansacFit, RansacParams, MIN_HOMOGRAPHY_POINTS};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
