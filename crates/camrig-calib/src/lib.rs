//! Calibration solvers for `camrig-rs`.
//!
//! Linear initialisation (DLT homography, Zhang intrinsics, plane-homography
//! pose decomposition, PnP) plus non-linear reprojection-error refinement on
//! a Levenberg–Marquardt backend. The linear stage supplies starting values;
//! the refinement stage minimises pixel reprojection error over intrinsics,
//! distortion and per-view poses jointly.

pub mod homography;
pub mod planar_pose;
pub mod pnp;
pub mod zhang;

pub mod optim;

pub use homography::{dlt_homography, HomographyError};
pub use planar_pose::pose_from_homography;
pub use pnp::{solve_pnp, PnpError};
pub use zhang::{intrinsics_from_homographies, ZhangError};

pub use optim::{
    pack_initial_params, refine_planar_intrinsics, LmBackend, NllsProblem, NllsSolverBackend,
    PlanarIntrinsicsProblem, PlanarRefinement, PlanarViewObservations, SolveOptions, SolveReport,
};
