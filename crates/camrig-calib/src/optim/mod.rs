//! Non-linear least squares refinement.
//!
//! A small problem/backend split: problems expose dense residual and
//! Jacobian evaluations, backends minimise them. The only backend here wraps
//! the `levenberg-marquardt` crate.

mod lm;
mod planar;
mod problem;

pub use lm::LmBackend;
pub use planar::{
    pack_initial_params, refine_planar_intrinsics, PlanarIntrinsicsProblem, PlanarRefinement,
    PlanarViewObservations,
};
pub use problem::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
