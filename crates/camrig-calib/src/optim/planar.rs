//! Joint refinement of intrinsics, distortion and per-view poses from planar
//! target observations.
//!
//! Parameter layout: `[fx, fy, cx, cy, skew, k1, k2, p1, p2, k3]` followed by
//! six pose parameters per view (axis-angle rotation then translation).

use camrig_core::{CameraIntrinsics, CameraModel, Distortion, Iso3, Pt2, Pt3, Real};
use nalgebra::{DMatrix, DVector, Translation3, UnitQuaternion, Vector3};

use super::problem::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

const INTRINSIC_PARAMS: usize = 10;
const POSE_PARAMS: usize = 6;

/// Observations for a single view of the planar target.
#[derive(Debug, Clone)]
pub struct PlanarViewObservations {
    /// Target points in board coordinates (z = 0).
    pub board_points: Vec<Pt3>,
    /// Detected pixels, one per board point.
    pub pixels: Vec<Pt2>,
}

impl PlanarViewObservations {
    pub fn new(board_points: Vec<Pt3>, pixels: Vec<Pt2>) -> Self {
        assert_eq!(
            board_points.len(),
            pixels.len(),
            "board/pixel point counts must match"
        );
        Self {
            board_points,
            pixels,
        }
    }

    pub fn len(&self) -> usize {
        self.board_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.board_points.is_empty()
    }
}

/// Reprojection-error bundle over all views of a planar target.
#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsProblem {
    views: Vec<PlanarViewObservations>,
}

impl PlanarIntrinsicsProblem {
    pub fn new(views: Vec<PlanarViewObservations>) -> Self {
        assert!(!views.is_empty(), "need at least one view");
        for (i, v) in views.iter().enumerate() {
            assert!(v.len() >= 4, "view {i} has too few points (need >= 4)");
        }
        Self { views }
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    pub fn param_dim(&self) -> usize {
        INTRINSIC_PARAMS + POSE_PARAMS * self.num_views()
    }

    pub fn residual_dim(&self) -> usize {
        self.views.iter().map(|v| 2 * v.len()).sum()
    }

    fn decode(&self, x: &DVector<Real>) -> (CameraModel, Vec<Iso3>) {
        debug_assert_eq!(x.len(), self.param_dim());

        let camera = CameraModel::new(
            CameraIntrinsics {
                fx: x[0],
                fy: x[1],
                cx: x[2],
                cy: x[3],
                skew: x[4],
            },
            Distortion {
                k1: x[5],
                k2: x[6],
                p1: x[7],
                p2: x[8],
                k3: x[9],
            },
        );

        let poses = (0..self.num_views())
            .map(|i| {
                let idx = INTRINSIC_PARAMS + POSE_PARAMS * i;
                let rvec = Vector3::new(x[idx], x[idx + 1], x[idx + 2]);
                let tvec = Vector3::new(x[idx + 3], x[idx + 4], x[idx + 5]);
                Iso3::from_parts(
                    Translation3::from(tvec),
                    UnitQuaternion::from_scaled_axis(rvec),
                )
            })
            .collect();

        (camera, poses)
    }
}

/// Pack a starting camera model and per-view poses into a parameter vector.
pub fn pack_initial_params(camera: &CameraModel, poses: &[Iso3]) -> DVector<Real> {
    assert!(!poses.is_empty(), "need at least one pose");
    let mut x = DVector::zeros(INTRINSIC_PARAMS + POSE_PARAMS * poses.len());

    let k = &camera.intrinsics;
    x[0] = k.fx;
    x[1] = k.fy;
    x[2] = k.cx;
    x[3] = k.cy;
    x[4] = k.skew;

    let d = &camera.distortion;
    x[5] = d.k1;
    x[6] = d.k2;
    x[7] = d.p1;
    x[8] = d.p2;
    x[9] = d.k3;

    for (i, pose) in poses.iter().enumerate() {
        let idx = INTRINSIC_PARAMS + POSE_PARAMS * i;
        let rvec = pose.rotation.scaled_axis();
        x[idx] = rvec.x;
        x[idx + 1] = rvec.y;
        x[idx + 2] = rvec.z;

        let t = pose.translation.vector;
        x[idx + 3] = t.x;
        x[idx + 4] = t.y;
        x[idx + 5] = t.z;
    }

    x
}

impl NllsProblem for PlanarIntrinsicsProblem {
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let (camera, poses) = self.decode(x);

        let mut r = DVector::zeros(self.residual_dim());
        let mut offset = 0;

        for (view, pose) in self.views.iter().zip(&poses) {
            for (pb, meas) in view.board_points.iter().zip(&view.pixels) {
                let p_cam = pose.transform_point(pb);
                // A point driven behind the camera during iteration gets a
                // large constant residual instead of a projection.
                let proj = camera
                    .project_point(&p_cam)
                    .unwrap_or_else(|| Pt2::new(meas.x + 1e6, meas.y + 1e6));

                r[offset] = meas.x - proj.x;
                r[offset + 1] = meas.y - proj.y;
                offset += 2;
            }
        }

        r
    }

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        // Forward-difference Jacobian; the problem sizes here (tens of
        // parameters) do not warrant analytic derivatives.
        let m = self.residual_dim();
        let n = x.len();
        let mut j = DMatrix::zeros(m, n);

        let base = self.residuals(x);
        let eps = 1e-6;

        for k in 0..n {
            let mut x_pert = x.clone();
            x_pert[k] += eps;
            let r_plus = self.residuals(&x_pert);
            j.set_column(k, &((r_plus - &base) / eps));
        }

        j
    }
}

/// Result of [`refine_planar_intrinsics`].
#[derive(Debug, Clone)]
pub struct PlanarRefinement {
    pub camera: CameraModel,
    pub poses: Vec<Iso3>,
    pub report: SolveReport,
    /// Mean pixel reprojection error over all observations at the solution.
    pub mean_reproj_error: Real,
}

/// Refine camera intrinsics, distortion and per-view poses.
pub fn refine_planar_intrinsics<B: NllsSolverBackend>(
    backend: &B,
    problem: &PlanarIntrinsicsProblem,
    initial_params: DVector<Real>,
    opts: &SolveOptions,
) -> PlanarRefinement {
    assert_eq!(
        initial_params.len(),
        problem.param_dim(),
        "initial parameter vector has wrong dimension"
    );

    let (x_opt, report) = backend.solve(problem, initial_params, opts);
    log::debug!(
        "planar refinement: {} evaluations, cost {:.3e}, converged: {}",
        report.iterations,
        report.final_cost,
        report.converged
    );
    let (camera, poses) = problem.decode(&x_opt);

    let residuals = problem.residuals(&x_opt);
    let n_points = residuals.len() / 2;
    let mean_reproj_error = if n_points == 0 {
        0.0
    } else {
        (0..n_points)
            .map(|i| {
                let dx = residuals[2 * i];
                let dy = residuals[2 * i + 1];
                (dx * dx + dy * dy).sqrt()
            })
            .sum::<Real>()
            / n_points as Real
    };

    PlanarRefinement {
        camera,
        poses,
        report,
        mean_reproj_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::LmBackend;
    use camrig_core::synthetic;

    #[test]
    fn refines_towards_ground_truth() {
        let cam_gt = CameraModel::new(
            CameraIntrinsics {
                fx: 800.0,
                fy: 780.0,
                cx: 640.0,
                cy: 360.0,
                skew: 0.0,
            },
            Distortion {
                k1: -0.1,
                k2: 0.01,
                p1: 0.001,
                p2: -0.001,
                k3: 0.0,
            },
        );

        let board = synthetic::grid_points(6, 4, 0.03);
        let poses_gt = synthetic::poses_yaw_y_z(2, 0.0, 0.1, 0.5, 0.2);

        let views: Vec<PlanarViewObservations> = poses_gt
            .iter()
            .map(|pose| {
                let pixels = synthetic::project_view(&cam_gt, pose, &board).unwrap();
                PlanarViewObservations::new(board.clone(), pixels)
            })
            .collect();

        let problem = PlanarIntrinsicsProblem::new(views);

        // Slightly wrong intrinsics, no distortion, ground-truth poses.
        let cam_init = CameraModel::new(
            CameraIntrinsics {
                fx: 780.0,
                fy: 760.0,
                cx: 630.0,
                cy: 350.0,
                skew: 0.0,
            },
            Distortion::default(),
        );

        let x0 = pack_initial_params(&cam_init, &poses_gt);
        let result =
            refine_planar_intrinsics(&LmBackend, &problem, x0, &SolveOptions::default());

        assert!(result.report.converged, "{:?}", result.report);
        assert!(result.mean_reproj_error < 1e-3);
        let k = result.camera.intrinsics;
        assert!((k.fx - 800.0).abs() < 5.0);
        assert!((k.fy - 780.0).abs() < 5.0);
        assert!((k.cx - 640.0).abs() < 5.0);
        assert!((k.cy - 360.0).abs() < 5.0);
        assert_eq!(result.poses.len(), poses_gt.len());
    }

    #[test]
    fn pack_decode_round_trip() {
        let cam = CameraModel::new(
            CameraIntrinsics {
                fx: 700.0,
                fy: 710.0,
                cx: 320.0,
                cy: 240.0,
                skew: 0.5,
            },
            Distortion {
                k1: -0.2,
                k2: 0.04,
                p1: 0.002,
                p2: -0.003,
                k3: 0.001,
            },
        );
        let poses = synthetic::poses_yaw_y_z(3, 0.05, 0.1, 0.6, 0.1);

        let board = synthetic::grid_points(3, 2, 0.05);
        let views: Vec<PlanarViewObservations> = poses
            .iter()
            .map(|p| {
                let px = synthetic::project_view(&cam, p, &board).unwrap();
                PlanarViewObservations::new(board.clone(), px)
            })
            .collect();
        let problem = PlanarIntrinsicsProblem::new(views);

        let x = pack_initial_params(&cam, &poses);
        let (cam_back, poses_back) = problem.decode(&x);

        assert_eq!(cam_back, cam);
        for (a, b) in poses_back.iter().zip(&poses) {
            assert!((a.translation.vector - b.translation.vector).norm() < 1e-12);
            assert!(a.rotation.angle_to(&b.rotation) < 1e-12);
        }
    }
}
