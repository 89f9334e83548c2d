//! Pose recovery from a plane-induced homography.

use camrig_core::{quaternion_from_matrix, reorthonormalize, Iso3, Mat3, Vec3};
use nalgebra::Translation3;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanarPoseError {
    #[error("calibration matrix is not invertible")]
    SingularIntrinsics,
    #[error("homography columns have vanishing norm")]
    DegenerateHomography,
    #[error("rotation could not be projected onto SO(3)")]
    RotationProjectionFailed,
}

/// Decompose a homography `H` (target plane → image) into the pose of the
/// planar target relative to the camera, given intrinsics `K`.
///
/// Assumes the target lies on `Z = 0` in its own coordinates; then
/// `H ~ K [r1 r2 t]` and the pose is recovered by unscaling `K⁻¹H` and
/// projecting the rotation block onto SO(3).
///
/// Returns `T_C_B`: target (board) coordinates into camera coordinates.
pub fn pose_from_homography(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, PlanarPoseError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or(PlanarPoseError::SingularIntrinsics)?;

    let k_inv_h1 = k_inv * hmtx.column(0);
    let k_inv_h2 = k_inv * hmtx.column(1);
    let h3 = hmtx.column(2).into_owned();

    // Scale factor: the first two columns of K⁻¹H are rotation columns, so
    // their norms should both be 1; average for robustness.
    let norm1 = k_inv_h1.norm();
    let norm2 = k_inv_h2.norm();
    if norm1 + norm2 < 1e-12 {
        return Err(PlanarPoseError::DegenerateHomography);
    }
    let lambda = 2.0 / (norm1 + norm2);

    let r1 = (lambda * k_inv_h1).into_owned();
    let r2 = (lambda * k_inv_h2).into_owned();
    let r3 = r1.cross(&r2);

    let mut r_approx = Mat3::zeros();
    r_approx.set_column(0, &r1);
    r_approx.set_column(1, &r2);
    r_approx.set_column(2, &r3);

    let r_orth = reorthonormalize(&r_approx).ok_or(PlanarPoseError::RotationProjectionFailed)?;

    let t_vec: Vec3 = lambda * (k_inv * h3);
    Ok(Iso3::from_parts(
        Translation3::from(t_vec),
        quaternion_from_matrix(&r_orth),
    ))
}
