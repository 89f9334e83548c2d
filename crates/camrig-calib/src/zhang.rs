//! Closed-form intrinsics initialisation from plane homographies.
//!
//! Implements Zhang's method: each homography of a planar target contributes
//! two linear constraints on the image of the absolute conic `B = K⁻ᵀK⁻¹`;
//! the intrinsics are read off the null vector of the stacked system.

use camrig_core::{CameraIntrinsics, Mat3, Real};
use nalgebra::{DMatrix, SVector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZhangError {
    #[error("need at least 3 homographies for intrinsics estimation, got {0}")]
    NotEnoughViews(usize),
    #[error("svd failed")]
    SvdFailed,
    #[error("degenerate homography configuration")]
    DegenerateConfiguration,
}

/// The 6-vector `v_ij(H)` of Zhang's constraint rows.
fn v_ij(h: &Mat3, i: usize, j: usize) -> SVector<Real, 6> {
    let hi = h.column(i);
    let hj = h.column(j);

    SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate camera intrinsics from a set of plane homographies.
///
/// Requires at least 3 views with genuinely different orientations; views
/// that only translate the target (or repeat the same pose) leave the conic
/// under-constrained and fail with [`ZhangError::DegenerateConfiguration`].
pub fn intrinsics_from_homographies(hmtxs: &[Mat3]) -> Result<CameraIntrinsics, ZhangError> {
    if hmtxs.len() < 3 {
        return Err(ZhangError::NotEnoughViews(hmtxs.len()));
    }

    let m = hmtxs.len();
    let mut vmtx = DMatrix::<Real>::zeros(2 * m, 6);

    for (k, h) in hmtxs.iter().enumerate() {
        let v11 = v_ij(h, 0, 0);
        let v22 = v_ij(h, 1, 1);
        let v12 = v_ij(h, 0, 1);

        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t.ok_or(ZhangError::SvdFailed)?;
    let b = v_t.row(v_t.nrows() - 1);

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    // B must be definite up to sign for the square roots below to exist.
    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-6 {
        return Err(ZhangError::DegenerateConfiguration);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() {
        return Err(ZhangError::DegenerateConfiguration);
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    if !(alpha.is_finite() && beta.is_finite() && u0.is_finite() && v0.is_finite()) {
        return Err(ZhangError::DegenerateConfiguration);
    }

    Ok(CameraIntrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camrig_core::{Iso3, Real};
    use nalgebra::{Rotation3, Translation3, Vector3};

    fn synthetic_homography(kmtx: &Mat3, rot: Rotation3<Real>, t: Vector3<Real>) -> Mat3 {
        // For the Z=0 plane, H = K [r1 r2 t].
        let iso = Iso3::from_parts(Translation3::from(t), rot.into());
        let binding = iso.rotation.to_rotation_matrix();
        let r_mat = binding.matrix();

        let mut h = Mat3::zeros();
        h.set_column(0, &(kmtx * r_mat.column(0)));
        h.set_column(1, &(kmtx * r_mat.column(1)));
        h.set_column(2, &(kmtx * t));
        h
    }

    #[test]
    fn recovers_intrinsics_from_three_views() {
        let k_gt = CameraIntrinsics {
            fx: 900.0,
            fy: 880.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        };
        let kmtx = k_gt.k_matrix();

        let hmts = vec![
            synthetic_homography(
                &kmtx,
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(0.1, -0.05, 1.0),
            ),
            synthetic_homography(
                &kmtx,
                Rotation3::from_euler_angles(-0.05, 0.15, -0.1),
                Vector3::new(-0.05, 0.1, 1.2),
            ),
            synthetic_homography(
                &kmtx,
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(0.0, 0.0, 0.9),
            ),
        ];

        let est = intrinsics_from_homographies(&hmts).unwrap();
        assert!((est.fx - k_gt.fx).abs() < 5.0, "fx mismatch: {}", est.fx);
        assert!((est.fy - k_gt.fy).abs() < 5.0, "fy mismatch: {}", est.fy);
        assert!((est.cx - k_gt.cx).abs() < 10.0, "cx mismatch: {}", est.cx);
        assert!((est.cy - k_gt.cy).abs() < 10.0, "cy mismatch: {}", est.cy);
        assert!(est.skew.abs() < 1e-6, "skew not ~0: {}", est.skew);
    }

    #[test]
    fn too_few_views_is_rejected() {
        let h = Mat3::identity();
        assert!(matches!(
            intrinsics_from_homographies(&[h, h]),
            Err(ZhangError::NotEnoughViews(2))
        ));
    }

    #[test]
    fn estimate_is_insensitive_to_homography_scale() {
        let k_gt = CameraIntrinsics {
            fx: 820.0,
            fy: 815.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        };
        let kmtx = k_gt.k_matrix();
        let hmts: Vec<Mat3> = [
            (0.1, 0.0, 0.05, 0.1, -0.05, 1.0),
            (-0.05, 0.15, -0.1, -0.05, 0.1, 1.2),
            (0.2, -0.1, 0.0, 0.0, 0.0, 0.9),
        ]
        .iter()
        .enumerate()
        .map(|(i, &(r1, r2, r3, t1, t2, t3))| {
            // Homographies are only defined up to scale; feed them in at
            // wildly different scales.
            synthetic_homography(
                &kmtx,
                Rotation3::from_euler_angles(r1, r2, r3),
                Vector3::new(t1, t2, t3),
            ) * (10.0_f64).powi(i as i32 - 1)
        })
        .collect();

        let est = intrinsics_from_homographies(&hmts).unwrap();
        assert!((est.fx - k_gt.fx).abs() < 5.0);
        assert!((est.fy - k_gt.fy).abs() < 5.0);
    }
}
