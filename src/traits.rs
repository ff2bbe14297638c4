use crate::error::Result;
use crate::solver::{Program, ProgramSolution};
use nalgebra::DVector;

/// A factored square matrix that can be solved against repeatedly.
///
/// Implementations are immutable once built and shared by reference
/// across worker threads.
pub trait Factorization: Send + Sync {
    /// Order of the factored matrix.
    fn dim(&self) -> usize;

    /// Solves `A x = rhs`.
    fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>>;
}

/// Back-end for constrained quadratic and linear programs.
pub trait ProgramSolver {
    /// Solves the program, returning the termination status together with
    /// whatever primal values the back-end produced. Errors are reserved for
    /// failures where no values exist at all.
    fn solve(&self, program: &Program) -> Result<ProgramSolution>;
}
