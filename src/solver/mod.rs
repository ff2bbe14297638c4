//! Constrained quadratic/linear programs and the back-ends that solve them.
//!
//! A [`Program`] is
//!
//! ```text
//! minimize    sum q_i x_i^2 + sum c_i x_i + k
//! subject to  a_j' x (<= | ==) r_j
//!             l_i <= x_i <= u_i
//!             x_i in {0, 1}  for binary variables
//! ```
//!
//! Back-ends implement [`ProgramSolver`](crate::traits::ProgramSolver).

mod bnb;
mod clarabel;

pub use self::bnb::BranchAndBound;
pub use self::clarabel::ClarabelSolver;

use crate::opt::SolverOpt;

/// Interior-point solver wrapped in branch-and-bound, configured from `opt`.
/// Handles every formulation of the capacity fit.
pub fn default_solver(opt: &SolverOpt) -> BranchAndBound<ClarabelSolver> {
    BranchAndBound::new(ClarabelSolver::new(opt), opt.clone())
}

/// Constraint sense.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Sense {
    Le,
    Eq,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub terms: Vec<(usize, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Coefficient of `x_i^2` in the objective.
    pub quadratic: Vec<f64>,
    /// Coefficient of `x_i` in the objective.
    pub linear: Vec<f64>,
    /// Constant objective offset, reported but not optimized.
    pub constant: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<Option<f64>>,
    pub binary: Vec<bool>,
    pub constraints: Vec<Constraint>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_vars(&self) -> usize {
        self.linear.len()
    }

    /// Adds a continuous variable and returns its index.
    pub fn add_var(&mut self, lower: f64, upper: Option<f64>) -> usize {
        self.quadratic.push(0.0);
        self.linear.push(0.0);
        self.lower.push(lower);
        self.upper.push(upper);
        self.binary.push(false);
        self.linear.len() - 1
    }

    /// Adds a variable restricted to {0, 1}.
    pub fn add_binary(&mut self) -> usize {
        let i = self.add_var(0.0, Some(1.0));
        self.binary[i] = true;
        i
    }

    pub fn add_constraint(&mut self, terms: Vec<(usize, f64)>, sense: Sense, rhs: f64) {
        self.constraints.push(Constraint { terms, sense, rhs });
    }

    pub fn has_binaries(&self) -> bool {
        self.binary.iter().any(|&b| b)
    }

    pub fn objective_value(&self, x: &[f64]) -> f64 {
        self.constant
            + x.iter()
                .zip(self.quadratic.iter().zip(&self.linear))
                .map(|(x, (q, c))| q * x * x + c * x)
                .sum::<f64>()
    }

    /// Largest violation of any constraint or bound at `x`.
    pub fn max_violation(&self, x: &[f64]) -> f64 {
        let mut worst = 0.0_f64;
        for c in &self.constraints {
            let lhs: f64 = c.terms.iter().map(|&(i, a)| a * x[i]).sum();
            let v = match c.sense {
                Sense::Le => lhs - c.rhs,
                Sense::Eq => (lhs - c.rhs).abs(),
            };
            worst = worst.max(v);
        }
        for (i, &xi) in x.iter().enumerate() {
            worst = worst.max(self.lower[i] - xi);
            if let Some(u) = self.upper[i] {
                worst = worst.max(xi - u);
            }
        }
        worst
    }
}

/// Termination status of a program solve.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum SolveStatus {
    Optimal,
    /// Converged to reduced accuracy.
    Suboptimal,
    Infeasible,
    Unbounded,
    IterationLimit,
    /// Branch-and-bound stopped before the tree was exhausted.
    NodeLimit,
    NumericalError,
}

impl SolveStatus {
    pub fn is_optimal(&self) -> bool {
        *self == SolveStatus::Optimal
    }

    /// Whether the primal values are meaningful, optimal or not.
    pub fn has_values(&self) -> bool {
        matches!(
            self,
            SolveStatus::Optimal
                | SolveStatus::Suboptimal
                | SolveStatus::IterationLimit
                | SolveStatus::NodeLimit
        )
    }
}

#[derive(Debug, Clone)]
pub struct ProgramSolution {
    pub status: SolveStatus,
    pub x: Vec<f64>,
    pub objective: f64,
    /// Interior-point iterations, or nodes for branch-and-bound.
    pub iterations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objective_and_violation() {
        let mut p = Program::new();
        let x = p.add_var(0.0, None);
        let y = p.add_binary();
        p.quadratic[x] = 1.0;
        p.linear[y] = -2.0;
        p.constant = 3.0;
        p.add_constraint(vec![(x, 1.0), (y, 1.0)], Sense::Le, 1.0);

        assert!(p.has_binaries());
        assert_eq!(p.objective_value(&[2.0, 1.0]), 5.0);
        assert_eq!(p.max_violation(&[2.0, 1.0]), 2.0);
        assert_eq!(p.max_violation(&[0.5, 0.5]), 0.0);
    }
}
