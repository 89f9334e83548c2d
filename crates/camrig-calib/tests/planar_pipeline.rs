//! Full linear-init → non-linear-refine pipeline on synthetic planar data.

use camrig_calib::{
    dlt_homography, intrinsics_from_homographies, pack_initial_params, pose_from_homography,
    refine_planar_intrinsics, LmBackend, PlanarIntrinsicsProblem, PlanarViewObservations,
    SolveOptions,
};
use camrig_core::{synthetic, CameraIntrinsics, CameraModel, Distortion, Mat3, Pt2};

fn ground_truth_camera() -> CameraModel {
    CameraModel::new(
        CameraIntrinsics {
            fx: 800.0,
            fy: 780.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        },
        Distortion {
            k1: -0.08,
            k2: 0.01,
            p1: 0.0005,
            p2: -0.0005,
            k3: 0.0,
        },
    )
}

#[test]
fn pipeline_recovers_intrinsics_from_synthetic_views() {
    let cam_gt = ground_truth_camera();
    let board = synthetic::grid_points(6, 5, 0.05);
    let board_2d: Vec<Pt2> = board.iter().map(|p| Pt2::new(p.x, p.y)).collect();
    let poses_gt = synthetic::poses_yaw_y_z(5, -0.2, 0.1, 0.6, 0.1);

    // Observed pixels per view.
    let views: Vec<Vec<Pt2>> = poses_gt
        .iter()
        .map(|pose| synthetic::project_view(&cam_gt, pose, &board).unwrap())
        .collect();

    // Linear stage: homographies → Zhang → per-view pose init.
    let homographies: Vec<Mat3> = views
        .iter()
        .map(|pixels| dlt_homography(&board_2d, pixels).unwrap())
        .collect();
    let k_init = intrinsics_from_homographies(&homographies).unwrap();

    // Distortion biases the linear estimate; it only has to be close enough
    // to seed the non-linear stage.
    assert!((k_init.fx - 800.0).abs() < 200.0, "fx init: {}", k_init.fx);

    let kmtx = k_init.k_matrix();
    let pose_init: Vec<_> = homographies
        .iter()
        .map(|h| pose_from_homography(&kmtx, h).unwrap())
        .collect();

    // Non-linear stage.
    let obs = views
        .iter()
        .map(|pixels| PlanarViewObservations::new(board.clone(), pixels.clone()))
        .collect();
    let problem = PlanarIntrinsicsProblem::new(obs);
    let x0 = pack_initial_params(
        &CameraModel::new(k_init, Distortion::default()),
        &pose_init,
    );

    let result = refine_planar_intrinsics(&LmBackend, &problem, x0, &SolveOptions::default());

    assert!(result.report.converged, "{:?}", result.report);
    assert!(
        result.mean_reproj_error < 0.1,
        "mean reprojection error too high: {}",
        result.mean_reproj_error
    );

    let k = result.camera.intrinsics;
    assert!((k.fx - 800.0).abs() < 2.0, "fx: {}", k.fx);
    assert!((k.fy - 780.0).abs() < 2.0, "fy: {}", k.fy);
    assert!((k.cx - 640.0).abs() < 2.0, "cx: {}", k.cx);
    assert!((k.cy - 360.0).abs() < 2.0, "cy: {}", k.cy);
    assert!((result.camera.distortion.k1 - (-0.08)).abs() < 0.01);
}
