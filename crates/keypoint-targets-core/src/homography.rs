use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Planar projective transform, `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    /// Pure translation by `(dx, dy)`.
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self::new(Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0))
    }

    fn project(&self, p: Point2<f32>) -> Vector3<f64> {
        self.h * Vector3::new(f64::from(p.x), f64::from(p.y), 1.0)
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.project(p);
        Point2::new((v.x / v.z) as f32, (v.y / v.z) as f32)
    }

    /// Like [`Homography::apply`], but `None` when the point maps to (or near)
    /// the line at infinity.
    #[inline]
    pub fn try_apply(&self, p: Point2<f32>) -> Option<Point2<f32>> {
        let v = self.project(p);
        if v.z.abs() < 1e-12 {
            return None;
        }
        let q = Point2::new((v.x / v.z) as f32, (v.y / v.z) as f32);
        (q.x.is_finite() && q.y.is_finite()).then_some(q)
    }

    /// Euclidean distance between `H * src` and `dst`; infinite when `src`
    /// has no finite image.
    #[inline]
    pub fn reprojection_error(&self, src: Point2<f32>, dst: Point2<f32>) -> f32 {
        self.try_apply(src)
            .map_or(f32::INFINITY, |q| (q - dst).norm())
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    pub fn is_finite(&self) -> bool {
        self.h.iter().all(|v| v.is_finite())
    }
}

/// Similarity that moves a point set to its centroid and scales it to a mean
/// distance of sqrt(2). Conditions the DLT system.
struct Conditioner {
    scale: f64,
    cx: f64,
    cy: f64,
}

impl Conditioner {
    fn fit(pts: &[Point2<f32>]) -> Self {
        let n = pts.len() as f64;
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(sx, sy), p| {
            (sx + f64::from(p.x), sy + f64::from(p.y))
        });
        let (cx, cy) = (sx / n, sy / n);
        let mean = pts
            .iter()
            .map(|p| (f64::from(p.x) - cx).hypot(f64::from(p.y) - cy))
            .sum::<f64>()
            / n;
        let scale = if mean > 1e-12 {
            std::f64::consts::SQRT_2 / mean
        } else {
            1.0
        };
        Self { scale, cx, cy }
    }

    fn apply(&self, p: Point2<f32>) -> (f64, f64) {
        (
            (f64::from(p.x) - self.cx) * self.scale,
            (f64::from(p.y) - self.cy) * self.scale,
        )
    }

    fn matrix(&self) -> Matrix3<f64> {
        let s = self.scale;
        Matrix3::new(s, 0.0, -s * self.cx, 0.0, s, -s * self.cy, 0.0, 0.0, 1.0)
    }

    fn inverse_matrix(&self) -> Matrix3<f64> {
        let r = 1.0 / self.scale;
        Matrix3::new(r, 0.0, self.cx, 0.0, r, self.cy, 0.0, 0.0, 1.0)
    }
}

/// Estimate H such that `dst ~ H * src` from at least 4 correspondences.
///
/// Normalized DLT: the solution is the eigenvector of `AᵀA` with the smallest
/// eigenvalue, which is exact for 4 points and least squares beyond. Returns
/// `None` for mismatched or short inputs and for degenerate configurations
/// (rank-deficient system or a singular result).
pub fn estimate_homography(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    let cs = Conditioner::fit(src);
    let cd = Conditioner::fit(dst);

    let mut ata = SMatrix::<f64, 9, 9>::zeros();
    for (&s, &d) in src.iter().zip(dst) {
        let (x, y) = cs.apply(s);
        let (u, v) = cd.apply(d);
        let rows = [
            SVector::<f64, 9>::from_column_slice(&[-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u]),
            SVector::<f64, 9>::from_column_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v]),
        ];
        for r in &rows {
            ata += r * r.transpose();
        }
    }

    let eig = ata.symmetric_eigen();
    let mut order: Vec<usize> = (0..9).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
    let largest = eig.eigenvalues[order[8]];
    // A one-dimensional null space is required for a unique solution.
    if largest <= 0.0 || eig.eigenvalues[order[1]] <= largest * 1e-10 {
        return None;
    }

    let e = eig.eigenvectors.column(order[0]);
    let hn = Matrix3::new(e[0], e[1], e[2], e[3], e[4], e[5], e[6], e[7], e[8]);
    let h = cd.inverse_matrix() * hn * cs.matrix();

    let w = h[(2, 2)];
    if w.abs() < 1e-12 || !w.is_finite() {
        return None;
    }
    let h = h / w;
    if h.determinant().abs() < 1e-12 {
        return None;
    }
    let out = Homography::new(h);
    out.is_finite().then_some(out)
}

/// Compute H such that `dst ~ H * src` from exactly 4 correspondences.
///
/// Corner order must be consistent between `src` and `dst`.
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    estimate_homography(src, dst)
}
