//! Small polygon helpers for contour gating.

use nalgebra::Point2;

#[inline]
fn cross(o: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f64 {
    let (ax, ay) = ((a.x - o.x) as f64, (a.y - o.y) as f64);
    let (bx, by) = ((b.x - o.x) as f64, (b.y - o.y) as f64);
    ax * by - ay * bx
}

/// Unsigned area enclosed by a closed polygon (shoelace formula).
///
/// Fewer than 3 vertices enclose no area.
pub fn polygon_area(pts: &[Point2<f32>]) -> f32 {
    if pts.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0f64;
    for (i, p) in pts.iter().enumerate() {
        let q = pts[(i + 1) % pts.len()];
        twice += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    (twice.abs() * 0.5) as f32
}

/// `true` when `pts` is a simple, strictly convex polygon.
///
/// Every turn must have the same orientation and the turns must wind
/// exactly once, which rules out self-intersecting "star" outlines.
pub fn is_convex_polygon(pts: &[Point2<f32>]) -> bool {
    let n = pts.len();
    if n < 3 || pts.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return false;
    }

    let mut sign = 0.0f64;
    let mut winding = 0.0f64;
    for i in 0..n {
        let a = pts[i];
        let b = pts[(i + 1) % n];
        let c = pts[(i + 2) % n];
        let z = cross(a, b, c);
        if z == 0.0 {
            return false;
        }
        if sign == 0.0 {
            sign = z.signum();
        } else if z.signum() != sign {
            return false;
        }

        let d1 = ((b.x - a.x) as f64, (b.y - a.y) as f64);
        let d2 = ((c.x - b.x) as f64, (c.y - b.y) as f64);
        let turn = (d1.0 * d2.1 - d1.1 * d2.0).atan2(d1.0 * d2.0 + d1.1 * d2.1);
        winding += turn;
    }

    (winding.abs() - std::f64::consts::TAU).abs() < 1e-3
}

/// Axis-aligned bounds `[min_x, min_y, max_x, max_y]`, or `None` when empty.
pub fn bounding_rect(pts: &[Point2<f32>]) -> Option<[f32; 4]> {
    let first = pts.first()?;
    let mut r = [first.x, first.y, first.x, first.y];
    for p in &pts[1..] {
        r[0] = r[0].min(p.x);
        r[1] = r[1].min(p.y);
        r[2] = r[2].max(p.x);
        r[3] = r[3].max(p.y);
    }
    Some(r)
}
