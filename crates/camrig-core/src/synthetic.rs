//! Synthetic planar-target helpers.
//!
//! Builds planar point grids (Z = 0), deterministic camera pose ramps, and
//! projected observations. Used by the test suites and by the CLI's
//! simulated device backend.

use nalgebra::{Translation3, UnitQuaternion};

use crate::camera::CameraModel;
use crate::math::{Iso3, Pt2, Pt3, Real, Vec3};

/// Generate a planar grid of 3D points (Z = 0) with `nx * ny` points.
///
/// Points are ordered deterministically in row-major order (Y major).
pub fn grid_points(nx: usize, ny: usize, spacing: Real) -> Vec<Pt3> {
    let mut points = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            points.push(Pt3::new(i as Real * spacing, j as Real * spacing, 0.0));
        }
    }
    points
}

/// The same grid as [`grid_points`], projected onto the board plane as 2D
/// coordinates.
pub fn grid_points_2d(nx: usize, ny: usize, spacing: Real) -> Vec<Pt2> {
    grid_points(nx, ny, spacing)
        .into_iter()
        .map(|p| Pt2::new(p.x, p.y))
        .collect()
}

/// Generate `n_views` target poses with a yaw ramp around +Y and a Z
/// translation ramp, keeping the board in front of the camera.
pub fn poses_yaw_y_z(
    n_views: usize,
    yaw_start_rad: Real,
    yaw_step_rad: Real,
    z_start: Real,
    z_step: Real,
) -> Vec<Iso3> {
    (0..n_views)
        .map(|idx| {
            let yaw = yaw_start_rad + yaw_step_rad * idx as Real;
            let rotation = UnitQuaternion::from_scaled_axis(Vec3::new(0.0, 1.0, 0.0) * yaw);
            let translation = Vec3::new(0.0, 0.0, z_start + z_step * idx as Real);
            Iso3::from_parts(Translation3::from(translation), rotation)
        })
        .collect()
}

/// Project every target point through `cam_from_target`, requiring all points
/// to be projectable.
///
/// Returns `None` if any point lands behind the camera, which indicates a bad
/// synthetic pose rather than a recoverable condition.
pub fn project_view(
    camera: &CameraModel,
    cam_from_target: &Iso3,
    target_points: &[Pt3],
) -> Option<Vec<Pt2>> {
    target_points
        .iter()
        .map(|pw| camera.project_point(&cam_from_target.transform_point(pw)))
        .collect()
}
