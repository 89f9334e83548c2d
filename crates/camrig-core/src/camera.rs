//! Pinhole camera model with Brown–Conrady radial/tangential distortion.
//!
//! The projection pipeline is the classical one the calibration solvers
//! minimise against: rigid transform → perspective divide → distortion of
//! normalised coordinates → calibration matrix `K`. Keeping every consumer on
//! this exact model is what makes overlays drawn from solved parameters land
//! on the observed features.

use serde::{Deserialize, Serialize};

use crate::math::{rigid_from_axis_angle, Iso3, Mat3, Pt2, Pt3, Real, Vec2, Vec3};

/// Camera intrinsics for a pinhole model.
///
/// The corresponding calibration matrix `K` has the form:
///
/// ```text
/// [ fx  skew  cx ]
/// [  0   fy   cy ]
/// [  0    0    1 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    pub skew: Real,
}

impl CameraIntrinsics {
    /// Build the 3×3 calibration matrix `K`.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    /// Attempt to construct intrinsics from a 3×3 calibration matrix.
    ///
    /// The matrix is normalised so that `K[2, 2] == 1` and checked against the
    /// standard upper-triangular structure; `None` if it does not match within
    /// a small tolerance.
    pub fn try_from_k_matrix(k: &Mat3) -> Option<Self> {
        let eps = 1e-9;
        let k33 = k[(2, 2)];
        if k33.abs() < eps {
            return None;
        }
        let k_norm = *k / k33;

        if k_norm[(1, 0)].abs() > eps || k_norm[(2, 0)].abs() > eps || k_norm[(2, 1)].abs() > eps {
            return None;
        }

        Some(Self {
            fx: k_norm[(0, 0)],
            skew: k_norm[(0, 1)],
            cx: k_norm[(0, 2)],
            fy: k_norm[(1, 1)],
            cy: k_norm[(1, 2)],
        })
    }
}

/// Brown–Conrady distortion coefficients `(k1, k2, p1, p2, k3)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: Real,
    pub k2: Real,
    pub p1: Real,
    pub p2: Real,
    pub k3: Real,
}

impl Distortion {
    /// Coefficients as the conventional fixed-size vector `[k1, k2, p1, p2, k3]`.
    pub fn coeffs(&self) -> [Real; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Apply distortion to normalised (pre-`K`) coordinates.
    pub fn distort(&self, n: &Vec2) -> Vec2 {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let x_t = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_t = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vec2::new(x * radial + x_t, y * radial + y_t)
    }

    /// Invert the distortion for normalised coordinates.
    ///
    /// Fixed-point iteration that pulls the distorted point back; converges in
    /// a handful of iterations for realistic coefficient magnitudes.
    pub fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        let mut x_u = n_dist.x;
        let mut y_u = n_dist.y;
        let max_iters = 10;
        let tol = 1e-12;

        for _ in 0..max_iters {
            let r2 = x_u * x_u + y_u * y_u;
            let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
            let x_t = 2.0 * self.p1 * x_u * y_u + self.p2 * (r2 + 2.0 * x_u * x_u);
            let y_t = self.p1 * (r2 + 2.0 * y_u * y_u) + 2.0 * self.p2 * x_u * y_u;

            let x_new = (n_dist.x - x_t) / radial;
            let y_new = (n_dist.y - y_t) / radial;

            let dx = x_new - x_u;
            let dy = y_new - y_u;
            x_u = x_new;
            y_u = y_new;
            if dx.abs().max(dy.abs()) < tol {
                break;
            }
        }

        Vec2::new(x_u, y_u)
    }
}

/// Pinhole camera: intrinsics plus distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(intrinsics: CameraIntrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a 3D point in camera coordinates to distorted pixel
    /// coordinates.
    ///
    /// Returns `None` for points at or behind the projection centre.
    pub fn project_point(&self, p_c: &Pt3) -> Option<Pt2> {
        if p_c.z <= 0.0 {
            return None;
        }
        let n = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let d = self.distortion.distort(&n);
        let k = &self.intrinsics;
        Some(Pt2::new(
            k.fx * d.x + k.skew * d.y + k.cx,
            k.fy * d.y + k.cy,
        ))
    }

    /// Map a measured (distorted) pixel to the ideal pixel that a
    /// distortion-free camera with the same `K` would observe.
    ///
    /// Returns `None` if the calibration matrix is singular.
    pub fn undistort_pixel(&self, pixel: &Pt2) -> Option<Pt2> {
        let k = self.intrinsics.k_matrix();
        let k_inv = k.try_inverse()?;

        let n_h = k_inv * Vec3::new(pixel.x, pixel.y, 1.0);
        let n_dist = Vec2::new(n_h.x / n_h.z, n_h.y / n_h.z);
        let n_undist = self.distortion.undistort(&n_dist);

        let p_h = k * Vec3::new(n_undist.x, n_undist.y, 1.0);
        Some(Pt2::new(p_h.x / p_h.z, p_h.y / p_h.z))
    }

    /// Unproject a distorted pixel and a depth along the optical axis into a
    /// 3D point in camera coordinates.
    ///
    /// Returns `None` for non-positive depth or a singular calibration matrix.
    pub fn unproject(&self, pixel: &Pt2, depth: Real) -> Option<Pt3> {
        if depth <= 0.0 {
            return None;
        }
        let ideal = self.undistort_pixel(pixel)?;
        let k_inv = self.intrinsics.k_matrix().try_inverse()?;
        let n = k_inv * Vec3::new(ideal.x, ideal.y, 1.0);
        Some(Pt3::new(n.x / n.z * depth, n.y / n.z * depth, depth))
    }
}

/// Project 3D points through an axis-angle extrinsic and the full camera
/// model, yielding distorted pixel coordinates.
///
/// `rvec`/`tvec` map the points' frame into the camera frame. Points that land
/// at or behind the projection centre are skipped; callers that need a 1:1
/// mapping should guarantee all points are in front of the camera.
pub fn project_points(
    points: &[Pt3],
    rvec: &Vec3,
    tvec: &Vec3,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> Vec<Pt2> {
    let cam = CameraModel::new(*intrinsics, *distortion);
    let to_cam: Iso3 = rigid_from_axis_angle(rvec, tvec);
    points
        .iter()
        .filter_map(|p| cam.project_point(&to_cam.transform_point(p)))
        .collect()
}
