//! Perspective-n-Point pose estimation.
//!
//! Solves for `T_C_W` (world → camera) from 3D world points and their pixel
//! observations. Pixels are undistorted up front so the linear solvers see an
//! ideal pinhole. Planar point sets (the common case for floor or wall
//! fiducials) are routed through the homography decomposition; general sets
//! go through a normalized DLT with the rotation projected onto SO(3).

use camrig_core::{
    quaternion_from_matrix, reorthonormalize, CameraIntrinsics, CameraModel, Distortion, Iso3,
    Mat3, Pt2, Pt3, Real, Vec3,
};
use nalgebra::{DMatrix, Matrix3x4, Translation3};
use thiserror::Error;

use crate::homography::dlt_homography;
use crate::planar_pose::pose_from_homography;

#[derive(Debug, Error)]
pub enum PnpError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point counts differ: {world} world vs {image} image")]
    MismatchedPoints { world: usize, image: usize },
    #[error("degenerate world-point configuration (collinear or coincident)")]
    DegeneratePoints,
    #[error("non-planar solve needs at least 6 points, got {0}")]
    NotEnoughPointsForGeneralSolve(usize),
    #[error("calibration matrix is not invertible")]
    SingularIntrinsics,
    #[error("linear solve failed")]
    SolveFailed,
}

/// Relative spread below which a principal axis is treated as collapsed.
const SPREAD_TOL: Real = 1e-9;

/// Principal spreads (singular values of the centred point cloud) and the
/// centroid, used to classify the point configuration.
struct PointSpread {
    centroid: Vec3,
    axes: Mat3,
    spreads: Vec3,
}

fn point_spread(world: &[Pt3]) -> Option<PointSpread> {
    let n = world.len() as Real;
    let centroid = world.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / n;

    let mut scatter = Mat3::zeros();
    for p in world {
        let d = p.coords - centroid;
        scatter += d * d.transpose();
    }

    let svd = scatter.svd(true, false);
    let axes = svd.u?;
    // Scatter is PSD, so singular values are the squared spreads.
    let spreads = Vec3::new(
        svd.singular_values[0].sqrt(),
        svd.singular_values[1].sqrt(),
        svd.singular_values[2].sqrt(),
    );
    Some(PointSpread {
        centroid,
        axes,
        spreads,
    })
}

/// Solve the PnP problem for `T_C_W`.
///
/// Degenerate inputs (fewer than 4 points, collinear or coincident world
/// points) are rejected rather than producing an ill-conditioned pose.
pub fn solve_pnp(
    world: &[Pt3],
    image: &[Pt2],
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> Result<Iso3, PnpError> {
    let n = world.len();
    if image.len() != n {
        return Err(PnpError::MismatchedPoints {
            world: n,
            image: image.len(),
        });
    }
    if n < 4 {
        return Err(PnpError::NotEnoughPoints(n));
    }

    // Undistort once; everything downstream assumes an ideal pinhole.
    let cam = CameraModel::new(*intrinsics, *distortion);
    let ideal: Option<Vec<Pt2>> = image.iter().map(|px| cam.undistort_pixel(px)).collect();
    let ideal = ideal.ok_or(PnpError::SingularIntrinsics)?;

    let spread = point_spread(world).ok_or(PnpError::SolveFailed)?;
    if spread.spreads[0] < SPREAD_TOL || spread.spreads[1] < SPREAD_TOL * spread.spreads[0].max(1.0)
    {
        // All points coincident, or all on one line.
        return Err(PnpError::DegeneratePoints);
    }

    let planar = spread.spreads[2] < 1e-6 * spread.spreads[0];
    if planar {
        solve_planar(world, &ideal, intrinsics, &spread)
    } else {
        solve_general(world, &ideal, intrinsics)
    }
}

/// Planar branch: express world points in an in-plane frame, estimate the
/// plane→image homography, decompose, and re-compose with the world→plane
/// transform.
fn solve_planar(
    world: &[Pt3],
    ideal: &[Pt2],
    intrinsics: &CameraIntrinsics,
    spread: &PointSpread,
) -> Result<Iso3, PnpError> {
    // Right-handed plane frame from the principal axes.
    let e1 = spread.axes.column(0).into_owned();
    let e2 = spread.axes.column(1).into_owned();
    let e3 = e1.cross(&e2);

    let mut r_plane = Mat3::zeros();
    r_plane.set_row(0, &e1.transpose());
    r_plane.set_row(1, &e2.transpose());
    r_plane.set_row(2, &e3.transpose());

    // World → plane coordinates (plane points have z ≈ 0).
    let world_to_plane = Iso3::from_parts(
        Translation3::from(-(r_plane * spread.centroid)),
        quaternion_from_matrix(&r_plane),
    );

    let board: Vec<Pt2> = world
        .iter()
        .map(|p| {
            let q = world_to_plane.transform_point(p);
            Pt2::new(q.x, q.y)
        })
        .collect();

    let h = dlt_homography(&board, ideal).map_err(|_| PnpError::SolveFailed)?;
    let plane_to_cam =
        pose_from_homography(&intrinsics.k_matrix(), &h).map_err(|_| PnpError::SolveFailed)?;

    Ok(plane_to_cam * world_to_plane)
}

/// General branch: normalized DLT for the 3×4 projection, then SO(3)
/// projection of the rotation block.
fn solve_general(
    world: &[Pt3],
    ideal: &[Pt2],
    intrinsics: &CameraIntrinsics,
) -> Result<Iso3, PnpError> {
    let n = world.len();
    if n < 6 {
        return Err(PnpError::NotEnoughPointsForGeneralSolve(n));
    }

    let kmtx = intrinsics.k_matrix();
    let k_inv = kmtx.try_inverse().ok_or(PnpError::SingularIntrinsics)?;

    // Normalize the 3D points: zero centroid, mean distance √3.
    let n_real = n as Real;
    let centroid = world.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / n_real;
    let mean_dist = world
        .iter()
        .map(|p| (p.coords - centroid).norm())
        .sum::<Real>()
        / n_real;
    if mean_dist <= Real::EPSILON {
        return Err(PnpError::DegeneratePoints);
    }
    let scale = (3.0_f64).sqrt() / mean_dist;

    let mut a = DMatrix::<Real>::zeros(2 * n, 12);
    for (i, (pw, pi)) in world.iter().zip(ideal.iter()).enumerate() {
        let x = (pw.x - centroid.x) * scale;
        let y = (pw.y - centroid.y) * scale;
        let z = (pw.z - centroid.z) * scale;

        // Normalized image point: K⁻¹ [u, v, 1]ᵀ.
        let v_img = k_inv * Vec3::new(pi.x, pi.y, 1.0);
        let u = v_img.x / v_img.z;
        let v = v_img.y / v_img.z;

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = z;
        a[(r0, 3)] = 1.0;
        a[(r0, 8)] = -u * x;
        a[(r0, 9)] = -u * y;
        a[(r0, 10)] = -u * z;
        a[(r0, 11)] = -u;

        a[(r1, 4)] = x;
        a[(r1, 5)] = y;
        a[(r1, 6)] = z;
        a[(r1, 7)] = 1.0;
        a[(r1, 8)] = -v * x;
        a[(r1, 9)] = -v * y;
        a[(r1, 10)] = -v * z;
        a[(r1, 11)] = -v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(PnpError::SolveFailed)?;
    let p_row = v_t.row(v_t.nrows() - 1);

    let mut p_mtx = Matrix3x4::<Real>::zeros();
    for r in 0..3 {
        for c in 0..4 {
            p_mtx[(r, c)] = p_row[4 * r + c];
        }
    }

    // Undo the 3D normalization: P ← P_norm · T_world.
    let mut t_world = nalgebra::Matrix4::<Real>::identity();
    t_world[(0, 0)] = scale;
    t_world[(1, 1)] = scale;
    t_world[(2, 2)] = scale;
    t_world[(0, 3)] = -scale * centroid.x;
    t_world[(1, 3)] = -scale * centroid.y;
    t_world[(2, 3)] = -scale * centroid.z;
    let p_mtx = p_mtx * t_world;

    let m = p_mtx.fixed_view::<3, 3>(0, 0).into_owned();

    // Fix the global scale (average row norm) and the sign via det(R) > 0.
    let mut s = (m.row(0).norm() + m.row(1).norm() + m.row(2).norm()) / 3.0;
    if m.determinant() < 0.0 {
        s = -s;
    }
    if s.abs() < 1e-12 {
        return Err(PnpError::SolveFailed);
    }

    let r_orth = reorthonormalize(&(m / s)).ok_or(PnpError::SolveFailed)?;
    let t = p_mtx.column(3).into_owned() / s;

    Ok(Iso3::from_parts(
        Translation3::from(t),
        quaternion_from_matrix(&r_orth),
    ))
}
