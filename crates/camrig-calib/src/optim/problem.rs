//! Problem and backend traits for dense non-linear least squares.

use camrig_core::Real;
use nalgebra::{DMatrix, DVector};

/// A dense non-linear least squares problem.
pub trait NllsProblem {
    /// Residual vector for the given parameters.
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real>;

    /// Jacobian of the residuals for the given parameters.
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real>;
}

#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    /// Maximum number of solver iterations before termination.
    ///
    /// The LM backend follows the MINPACK convention and interprets this as
    /// a patience value on function evaluations.
    pub max_iters: usize,
    /// Relative tolerance on the objective (cost) reduction.
    pub ftol: Real,
    /// Orthogonality/gradient tolerance.
    pub gtol: Real,
    /// Relative tolerance on parameter updates.
    pub xtol: Real,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-10,
            gtol: 1e-10,
            xtol: 1e-10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolveReport {
    pub iterations: usize,
    pub final_cost: Real,
    pub converged: bool,
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}
