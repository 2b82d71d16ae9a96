//! Camera-to-screen perspective mapping
//!
//! Builds a reusable 3x3 projective transform from the four calibration
//! corners once per calibration, then applies it per point in O(1). The
//! linear solve (DLT with Hartley normalization) is paid only on
//! recalibration, never per frame.

use crate::domain::types::{CalibrationQuad, Point};
use nalgebra::{Matrix3, SMatrix, Vector3};

/// Relative tolerance for degeneracy: the determinant of the Frobenius-
/// normalized homography must exceed this, and the four calibration corners
/// must reproject onto their destinations within 1e-6 of the screen scale.
const DET_TOLERANCE: f64 = 1e-9;
const REPROJECTION_TOLERANCE: f64 = 1e-6;

/// Calibration input cannot produce a usable transform (collinear or
/// coincident corners). The previous transform, if any, stays in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DegenerateCalibration;

impl std::fmt::Display for DegenerateCalibration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "calibration corners are collinear or coincident")
    }
}

impl std::error::Error for DegenerateCalibration {}

/// Immutable camera-space to screen-space homography.
///
/// Owned by the frame pipeline and replaced wholesale on recalibration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectiveTransform {
    h: Matrix3<f64>,
    width: f64,
    height: f64,
}

/// Order four unordered corners as (top-left, top-right, bottom-right,
/// bottom-left): sort by (y, x) ascending, take the first two as the top
/// pair and the last two as the bottom pair, then split each pair by x.
/// The result is independent of input order.
fn canonicalize(quad: &CalibrationQuad) -> [Point; 4] {
    let mut pts = *quad.corners();
    pts.sort_by(|a, b| (a.y, a.x).partial_cmp(&(b.y, b.x)).unwrap_or(std::cmp::Ordering::Equal));

    let (top_left, top_right) =
        if pts[0].x <= pts[1].x { (pts[0], pts[1]) } else { (pts[1], pts[0]) };
    let (bottom_left, bottom_right) =
        if pts[2].x <= pts[3].x { (pts[2], pts[3]) } else { (pts[3], pts[2]) };

    [top_left, top_right, bottom_right, bottom_left]
}

/// Normalizing transform: centroid to origin, mean distance sqrt(2).
fn normalize_points(pts: &[Point; 4]) -> (Matrix3<f64>, [Point; 4]) {
    let n = pts.len() as f64;
    let cx: f64 = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy: f64 = pts.iter().map(|p| p.y).sum::<f64>() / n;

    let mean_dist: f64 = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 { std::f64::consts::SQRT_2 / mean_dist } else { 1.0 };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized =
        [0, 1, 2, 3].map(|i| Point::new(s * (pts[i].x - cx), s * (pts[i].y - cy)));

    (t, normalized)
}

/// DLT homography from exactly four correspondences.
fn solve_dlt(src: &[Point; 4], dst: &[Point; 4]) -> Option<Matrix3<f64>> {
    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    // 8x9 system; each correspondence contributes two rows
    let mut a: SMatrix<f64, 8, 9> = SMatrix::zeros();
    for i in 0..4 {
        let (sx, sy) = (src_n[i].x, src_n[i].y);
        let (dx, dy) = (dst_n[i].x, dst_n[i].y);

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // h is the eigenvector of the smallest eigenvalue of the 9x9 AᵀA
    let ata = a.transpose() * a;
    let eig = nalgebra::SymmetricEigen::new(ata);

    let mut min_idx = 0;
    let mut min_val = eig.eigenvalues[0].abs();
    for i in 1..9 {
        let v = eig.eigenvalues[i].abs();
        if v < min_val {
            min_val = v;
            min_idx = i;
        }
    }
    let h = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    // Denormalize: H = T_dst^-1 * H_norm * T_src
    let t_dst_inv = t_dst.try_inverse()?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Some(h)
    } else {
        Some(h / scale)
    }
}

/// Project a point through a 3x3 homography, or None at a vanishing point.
fn project(h: &Matrix3<f64>, p: Point) -> Option<Point> {
    let v = h * Vector3::new(p.x, p.y, 1.0);
    if v[2].abs() < 1e-15 {
        return None;
    }
    Some(Point::new(v[0] / v[2], v[1] / v[2]))
}

impl ProjectiveTransform {
    /// Build the transform mapping the calibration quad onto the target
    /// rectangle `(0,0)..(width,height)`. Corners may arrive in any order.
    pub fn build(
        quad: &CalibrationQuad,
        (width, height): (f64, f64),
    ) -> Result<Self, DegenerateCalibration> {
        let src = canonicalize(quad);
        let dst = [
            Point::new(0.0, 0.0),
            Point::new(width, 0.0),
            Point::new(width, height),
            Point::new(0.0, height),
        ];

        let h = solve_dlt(&src, &dst).ok_or(DegenerateCalibration)?;

        // A homography collapsing the plane onto a line has determinant ~0
        let h_unit = h / h.norm();
        if h_unit.determinant().abs() < DET_TOLERANCE {
            return Err(DegenerateCalibration);
        }

        // The four correspondences must actually hold
        let scale = width.max(height);
        for (s, d) in src.iter().zip(dst.iter()) {
            let p = project(&h, *s).ok_or(DegenerateCalibration)?;
            let err = ((p.x - d.x).powi(2) + (p.y - d.y).powi(2)).sqrt();
            if err > REPROJECTION_TOLERANCE * scale {
                return Err(DegenerateCalibration);
            }
        }

        Ok(Self { h, width, height })
    }

    /// Map one camera-space point into screen space.
    ///
    /// Returns `None` when the mapped point falls outside the inclusive
    /// screen rectangle `[0,W]x[0,H]`: a shot that missed the surface,
    /// not a failure.
    pub fn apply(&self, point: Point) -> Option<Point> {
        let p = project(&self.h, point)?;
        if p.x >= 0.0 && p.x <= self.width && p.y >= 0.0 && p.y <= self.height {
            Some(p)
        } else {
            None
        }
    }

    pub fn target_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad(pts: [(f64, f64); 4]) -> CalibrationQuad {
        CalibrationQuad::new(pts.map(Point::from))
    }

    fn sample_quad() -> CalibrationQuad {
        quad([(100.0, 100.0), (500.0, 100.0), (500.0, 400.0), (100.0, 400.0)])
    }

    /// All 24 input orderings of a convex quad
    fn permutations(pts: &[Point; 4]) -> Vec<[Point; 4]> {
        let mut out = Vec::with_capacity(24);
        for i in 0..4 {
            for j in 0..4 {
                for k in 0..4 {
                    for l in 0..4 {
                        if i != j && i != k && i != l && j != k && j != l && k != l {
                            out.push([pts[i], pts[j], pts[k], pts[l]]);
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn test_canonicalize_orders_corners() {
        let q = quad([(500.0, 400.0), (100.0, 100.0), (100.0, 400.0), (500.0, 100.0)]);
        let ordered = canonicalize(&q);
        assert_eq!(ordered[0], Point::new(100.0, 100.0)); // top-left
        assert_eq!(ordered[1], Point::new(500.0, 100.0)); // top-right
        assert_eq!(ordered[2], Point::new(500.0, 400.0)); // bottom-right
        assert_eq!(ordered[3], Point::new(100.0, 400.0)); // bottom-left
    }

    #[test]
    fn test_permutation_invariant() {
        let base = ProjectiveTransform::build(&sample_quad(), (1920.0, 1080.0)).unwrap();
        let probes = [Point::new(300.0, 250.0), Point::new(150.0, 120.0), Point::new(480.0, 390.0)];

        for perm in permutations(sample_quad().corners()) {
            let t = ProjectiveTransform::build(&CalibrationQuad::new(perm), (1920.0, 1080.0))
                .unwrap();
            for probe in probes {
                let a = base.apply(probe).unwrap();
                let b = t.apply(probe).unwrap();
                assert_relative_eq!(a.x, b.x, epsilon = 1e-6);
                assert_relative_eq!(a.y, b.y, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_corners_round_trip() {
        let t = ProjectiveTransform::build(&sample_quad(), (1920.0, 1080.0)).unwrap();
        let expected = [(0.0, 0.0), (1920.0, 0.0), (1920.0, 1080.0), (0.0, 1080.0)];

        for (src, (ex, ey)) in canonicalize(&sample_quad()).iter().zip(expected) {
            let p = t.apply(*src).unwrap();
            assert_relative_eq!(p.x, ex, epsilon = 1e-3);
            assert_relative_eq!(p.y, ey, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_quad_midpoint_maps_to_screen_center() {
        let t = ProjectiveTransform::build(&sample_quad(), (1920.0, 1080.0)).unwrap();
        let p = t.apply(Point::new(300.0, 250.0)).unwrap();
        assert_relative_eq!(p.x, 960.0, epsilon = 1e-3);
        assert_relative_eq!(p.y, 540.0, epsilon = 1e-3);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        // Identity calibration: quad already spans the target rectangle
        let q = quad([(0.0, 0.0), (1920.0, 0.0), (1920.0, 1080.0), (0.0, 1080.0)]);
        let t = ProjectiveTransform::build(&q, (1920.0, 1080.0)).unwrap();

        assert!(t.apply(Point::new(0.0, 0.0)).is_some());
        assert!(t.apply(Point::new(1920.0, 1080.0)).is_some());
        assert!(t.apply(Point::new(-1.0, 0.0)).is_none());
        assert!(t.apply(Point::new(1921.0, 0.0)).is_none());
    }

    #[test]
    fn test_collinear_corners_rejected() {
        let q = quad([(0.0, 0.0), (100.0, 100.0), (200.0, 200.0), (300.0, 300.0)]);
        assert_eq!(
            ProjectiveTransform::build(&q, (1920.0, 1080.0)).unwrap_err(),
            DegenerateCalibration
        );
    }

    #[test]
    fn test_coincident_corners_rejected() {
        let q = quad([(50.0, 50.0), (50.0, 50.0), (500.0, 400.0), (100.0, 400.0)]);
        assert!(ProjectiveTransform::build(&q, (1920.0, 1080.0)).is_err());
    }

    #[test]
    fn test_perspective_skewed_quad() {
        // The projector corners observed by the original prototype's camera
        let q = quad([(346.0, 204.0), (905.0, 185.0), (943.0, 538.0), (301.0, 542.0)]);
        let t = ProjectiveTransform::build(&q, (1920.0, 1080.0)).unwrap();

        let tl = t.apply(Point::new(346.0, 204.0)).unwrap();
        assert_relative_eq!(tl.x, 0.0, epsilon = 1e-3);
        assert_relative_eq!(tl.y, 0.0, epsilon = 1e-3);

        // A point outside the quad maps off-screen
        assert!(t.apply(Point::new(10.0, 10.0)).is_none());
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let a = ProjectiveTransform::build(&sample_quad(), (1920.0, 1080.0)).unwrap();
        let b = ProjectiveTransform::build(&sample_quad(), (1920.0, 1080.0)).unwrap();
        for probe in [Point::new(200.0, 200.0), Point::new(450.0, 350.0)] {
            let pa = a.apply(probe).unwrap();
            let pb = b.apply(probe).unwrap();
            assert_relative_eq!(pa.x, pb.x, epsilon = 1e-9);
            assert_relative_eq!(pa.y, pb.y, epsilon = 1e-9);
        }
    }
}
