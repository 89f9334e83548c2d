//! Mathematical type definitions and rigid-transform utilities.
//!
//! All rotations are right-handed. Extrinsic rotations are carried around as
//! axis-angle vectors (`rvec`) whose norm is the rotation angle in radians,
//! matching the convention the pose solvers produce.

use nalgebra::{
    Isometry3, Matrix3, Matrix4, Point2, Point3, Rotation3, Translation3, UnitQuaternion, Vector2,
    Vector3,
};

/// Scalar type used throughout the workspace (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Tolerance on `‖R·Rᵀ − I‖` above which a rotation block is not accepted
/// as orthonormal.
pub const ORTHONORMALITY_TOL: Real = 1e-6;

/// Convert a 2D point in Euclidean coordinates into homogeneous coordinates.
pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

/// Convert a 3D homogeneous vector back to a 2D point.
///
/// The input is interpreted as `(x, y, w)` and the result is `(x / w, y / w)`.
/// The caller is responsible for ensuring that `w != 0`.
pub fn from_homogeneous(v: &Vec3) -> Pt2 {
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Build a rigid transform from an axis-angle rotation vector and a
/// translation vector.
///
/// With `rvec`/`tvec` expressing a world→camera extrinsic (the pose-solver
/// output convention), the result maps world points into the camera frame.
pub fn rigid_from_axis_angle(rvec: &Vec3, tvec: &Vec3) -> Iso3 {
    let rotation = UnitQuaternion::from_scaled_axis(*rvec);
    Iso3::from_parts(Translation3::from(*tvec), rotation)
}

/// Camera-to-world transform for a camera whose world→camera extrinsic is
/// `(rvec, tvec)`.
///
/// Applying the result to the origin yields the camera's position in world
/// coordinates; `Iso3::to_homogeneous` supplies the 4×4 matrix form.
pub fn camera_to_world(rvec: &Vec3, tvec: &Vec3) -> Iso3 {
    rigid_from_axis_angle(rvec, tvec).inverse()
}

/// Measure how far `r` is from being orthonormal: `max |(R·Rᵀ − I)_ij|`.
pub fn rotation_orthonormality_error(r: &Mat3) -> Real {
    let residual = r * r.transpose() - Mat3::identity();
    residual.iter().fold(0.0, |acc: Real, v| acc.max(v.abs()))
}

/// Project an approximate rotation matrix onto SO(3) via SVD (polar
/// decomposition), fixing the determinant sign if needed.
///
/// Returns `None` if the SVD does not yield both factors, which only happens
/// for pathological (non-finite) input.
pub fn reorthonormalize(r: &Mat3) -> Option<Mat3> {
    let svd = r.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }
    Some(r_orth)
}

/// Convert an orthonormal rotation matrix into a unit quaternion.
pub fn quaternion_from_matrix(r: &Mat3) -> UnitQuaternion<Real> {
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*r))
}
