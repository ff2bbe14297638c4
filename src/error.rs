use crate::solver::SolveStatus;
use crate::transaction::Transaction;
use crate::opt::Formulation;
use std::fmt;
use thiserror::Error;

/// Fatal conditions that abort a reduction run.
#[derive(Debug, Error)]
pub enum ReductionError {
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("invalid transaction: bus {0} cannot transfer to itself")]
    InvalidTransaction(usize),

    #[error("bus {0} not found")]
    UnknownBus(usize),

    #[error("factorization failed: {0}")]
    Factorization(String),

    #[error("solver failed: {0}")]
    Solver(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),
}

pub type Result<T> = std::result::Result<T, ReductionError>;

/// Recoverable conditions surfaced next to a result.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A matrix could not be factored and its pseudoinverse was used instead.
    SingularMatrix { context: String, rcond: f64 },

    /// The capacity fit terminated without proving optimality. The returned
    /// capacities are whatever the solver produced.
    SolverNonOptimal {
        formulation: Formulation,
        status: SolveStatus,
    },

    /// Transaction excluded from the fit because its original TTC is unbounded.
    UnfittedTransaction(Transaction),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SingularMatrix { context, rcond } => write!(
                f,
                "{} is singular (rcond = {:e}), using pseudoinverse",
                context, rcond
            ),
            Warning::SolverNonOptimal {
                formulation,
                status,
            } => write!(f, "{} fit terminated with status {:?}", formulation, status),
            Warning::UnfittedTransaction(t) => {
                write!(f, "transaction {} has unbounded original TTC, not fitted", t)
            }
        }
    }
}

impl Warning {
    /// Logs the warning and hands it back, for use in `push(w.log())`.
    pub(crate) fn log(self) -> Self {
        log::warn!("{}", self);
        self
    }
}
