use keypoint_targets_core::{DescriptorExtractor, Descriptors, Features, GrayImageView, Keypoint};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Descriptor width in bytes (256 binary tests).
pub const BRIEF_BYTES: usize = 32;

/// Half side of the box filter applied to every test sample.
const SMOOTH_RADIUS: i32 = 2;

/// Oriented BRIEF settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefParams {
    /// Radius of the sampling patch around each keypoint.
    pub patch_radius: u32,
    /// Seed of the test-pair pattern. Reference and query features must
    /// share it to be comparable.
    pub seed: u64,
    /// Steer the pattern by the intensity-centroid orientation.
    pub oriented: bool,
}

impl Default for BriefParams {
    fn default() -> Self {
        Self {
            patch_radius: 15,
            seed: 0x0b1e_f00d,
            oriented: true,
        }
    }
}

/// Computes 256-bit binary descriptors for keypoints.
#[derive(Clone, Debug)]
pub struct BriefExtractor {
    params: BriefParams,
    pairs: Vec<[(f32, f32); 2]>,
}

impl Default for BriefExtractor {
    fn default() -> Self {
        Self::new(BriefParams::default())
    }
}

impl BriefExtractor {
    pub fn new(params: BriefParams) -> Self {
        let pairs = sample_pairs(&params);
        Self { params, pairs }
    }

    #[inline]
    pub fn params(&self) -> &BriefParams {
        &self.params
    }

    fn margin(&self) -> i32 {
        self.params.patch_radius as i32 + 1
    }

    fn describe(
        &self,
        integral: &Integral,
        img: &GrayImageView<'_>,
        kp: &Keypoint,
    ) -> Option<(Keypoint, [u8; BRIEF_BYTES])> {
        let cx = kp.position.x.round() as i32;
        let cy = kp.position.y.round() as i32;
        let m = self.margin();
        if cx < m || cy < m || cx >= img.width as i32 - m || cy >= img.height as i32 - m {
            return None;
        }

        let angle = if self.params.oriented {
            centroid_angle(img, cx, cy, self.params.patch_radius as i32)
        } else {
            0.0
        };
        let (s, c) = angle.sin_cos();

        let mut desc = [0u8; BRIEF_BYTES];
        for (bit, [(ax, ay), (bx, by)]) in self.pairs.iter().enumerate() {
            let pa = (
                cx + (c * ax - s * ay).round() as i32,
                cy + (s * ax + c * ay).round() as i32,
            );
            let pb = (
                cx + (c * bx - s * by).round() as i32,
                cy + (s * bx + c * by).round() as i32,
            );
            if integral.box_sum(pa.0, pa.1) < integral.box_sum(pb.0, pb.1) {
                desc[bit / 8] |= 1 << (bit % 8);
            }
        }

        Some((Keypoint { angle, ..*kp }, desc))
    }
}

impl DescriptorExtractor for BriefExtractor {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, image, keypoints), fields(n = keypoints.len()))
    )]
    fn compute(&self, image: &GrayImageView<'_>, keypoints: Vec<Keypoint>) -> Features {
        let integral = Integral::new(image);
        let described: Vec<(Keypoint, [u8; BRIEF_BYTES])> = keypoints
            .par_iter()
            .filter_map(|kp| self.describe(&integral, image, kp))
            .collect();

        let mut kps = Vec::with_capacity(described.len());
        let mut descs = Descriptors::new(BRIEF_BYTES);
        for (kp, d) in described {
            kps.push(kp);
            descs.push_row(&d);
        }
        log::trace!("brief: described {}/{} keypoints", kps.len(), keypoints.len());
        Features::new(kps, descs).unwrap_or_else(|| Features::empty(BRIEF_BYTES))
    }
}

/// 256 test pairs inside a disk, so any rotation stays within the patch.
fn sample_pairs(params: &BriefParams) -> Vec<[(f32, f32); 2]> {
    let r = (params.patch_radius as i32 - SMOOTH_RADIUS).max(1);
    let r2 = r * r;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut point = move || loop {
        let x = rng.gen_range(-r..=r);
        let y = rng.gen_range(-r..=r);
        if x * x + y * y <= r2 {
            return (x as f32, y as f32);
        }
    };
    (0..BRIEF_BYTES * 8).map(|_| [point(), point()]).collect()
}

/// Orientation of the intensity centroid of a disk patch, in radians.
fn centroid_angle(img: &GrayImageView<'_>, cx: i32, cy: i32, radius: i32) -> f32 {
    let r2 = radius * radius;
    let (mut m10, mut m01) = (0i64, 0i64);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let v = img.get(cx + dx, cy + dy) as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

/// Summed-area table for constant-time box sums.
struct Integral {
    width: usize,
    height: usize,
    sums: Vec<u64>,
}

impl Integral {
    fn new(img: &GrayImageView<'_>) -> Self {
        let (w, h) = (img.width, img.height);
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                row += img.data[y * w + x] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self {
            width: w,
            height: h,
            sums,
        }
    }

    /// Sum over the clamped box of half side [`SMOOTH_RADIUS`] centred at `(x, y)`.
    fn box_sum(&self, x: i32, y: i32) -> u64 {
        let clamp = |v: i32, hi: usize| v.clamp(0, hi as i32) as usize;
        let x0 = clamp(x - SMOOTH_RADIUS, self.width);
        let y0 = clamp(y - SMOOTH_RADIUS, self.height);
        let x1 = clamp(x + SMOOTH_RADIUS + 1, self.width);
        let y1 = clamp(y + SMOOTH_RADIUS + 1, self.height);
        let s = self.width + 1;
        self.sums[y1 * s + x1] + self.sums[y0 * s + x0]
            - self.sums[y0 * s + x1]
            - self.sums[y1 * s + x0]
    }
}
