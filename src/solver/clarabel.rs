use super::{Program, ProgramSolution, Sense, SolveStatus};
use crate::error::{ReductionError, Result};
use crate::opt::SolverOpt;
use crate::traits::ProgramSolver;
use ::clarabel::algebra::CscMatrix;
use ::clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};

/// Interior-point back-end for continuous programs.
///
/// Binary restrictions are ignored: a program with binary variables is
/// solved as its continuous relaxation. Wrap in
/// [`BranchAndBound`](super::BranchAndBound) to enforce them.
#[derive(Debug, Clone)]
pub struct ClarabelSolver {
    pub max_iter: u32,
    pub tol_feas: f64,
    /// Used for both the absolute and the relative duality gap.
    pub tol_gap: f64,
}

impl ClarabelSolver {
    pub fn new(opt: &SolverOpt) -> Self {
        Self {
            max_iter: opt.max_iter,
            tol_feas: opt.tol_feas,
            tol_gap: opt.tol_gap,
        }
    }
}

impl Default for ClarabelSolver {
    fn default() -> Self {
        Self::new(&SolverOpt::default())
    }
}

/// Clarabel wants `Ax + s = b, s in K` with the cones in row order, so
/// equalities are emitted first (zero cone) followed by inequalities and
/// bounds (nonnegative cone).
struct ConicForm {
    /// Column-wise (row, value) entries of A.
    cols: Vec<Vec<(usize, f64)>>,
    b: Vec<f64>,
    n_eq: usize,
    n_ineq: usize,
}

impl ConicForm {
    fn new(n: usize) -> Self {
        Self {
            cols: vec![Vec::new(); n],
            b: Vec::new(),
            n_eq: 0,
            n_ineq: 0,
        }
    }

    fn push_row(&mut self, terms: &[(usize, f64)], rhs: f64) {
        let row = self.b.len();
        for &(i, a) in terms {
            if a != 0.0 {
                self.cols[i].push((row, a));
            }
        }
        self.b.push(rhs);
    }

    fn from_program(program: &Program) -> Self {
        let n = program.num_vars();
        let mut form = ConicForm::new(n);

        for c in program.constraints.iter().filter(|c| c.sense == Sense::Eq) {
            form.push_row(&c.terms, c.rhs);
            form.n_eq += 1;
        }
        for i in 0..n {
            if program.upper[i] == Some(program.lower[i]) {
                form.push_row(&[(i, 1.0)], program.lower[i]);
                form.n_eq += 1;
            }
        }

        let first_ineq = form.b.len();
        for c in program.constraints.iter().filter(|c| c.sense == Sense::Le) {
            form.push_row(&c.terms, c.rhs);
        }
        for i in 0..n {
            let (lo, up) = (program.lower[i], program.upper[i]);
            if up == Some(lo) {
                continue;
            }
            if lo.is_finite() {
                form.push_row(&[(i, -1.0)], -lo);
            }
            if let Some(up) = up {
                form.push_row(&[(i, 1.0)], up);
            }
        }
        form.n_ineq = form.b.len() - first_ineq;
        form
    }

    fn a_mat(&mut self) -> CscMatrix<f64> {
        let m = self.b.len();
        let n = self.cols.len();
        let mut col_ptr = Vec::with_capacity(n + 1);
        let mut row_idx = Vec::new();
        let mut values = Vec::new();
        for col in self.cols.iter_mut() {
            col_ptr.push(row_idx.len());
            col.sort_by_key(|&(r, _)| r);
            for &(r, v) in col.iter() {
                row_idx.push(r);
                values.push(v);
            }
        }
        col_ptr.push(row_idx.len());
        CscMatrix::new(m, n, col_ptr, row_idx, values)
    }

    fn cones(&self) -> Vec<SupportedConeT<f64>> {
        let mut cones = Vec::with_capacity(2);
        if self.n_eq > 0 {
            cones.push(SupportedConeT::ZeroConeT(self.n_eq));
        }
        if self.n_ineq > 0 {
            cones.push(SupportedConeT::NonnegativeConeT(self.n_ineq));
        }
        cones
    }
}

/// Diagonal objective Hessian. Clarabel minimizes `1/2 x'Px + q'x`, so
/// `P_ii = 2 q_i` for a `q_i x_i^2` term.
fn p_mat(program: &Program) -> CscMatrix<f64> {
    let n = program.num_vars();
    let mut col_ptr = Vec::with_capacity(n + 1);
    let mut row_idx = Vec::new();
    let mut values = Vec::new();
    for (i, &q) in program.quadratic.iter().enumerate() {
        col_ptr.push(row_idx.len());
        if q != 0.0 {
            row_idx.push(i);
            values.push(2.0 * q);
        }
    }
    col_ptr.push(row_idx.len());
    CscMatrix::new(n, n, col_ptr, row_idx, values)
}

fn map_status(status: &SolverStatus) -> SolveStatus {
    match status {
        SolverStatus::Solved => SolveStatus::Optimal,
        SolverStatus::AlmostSolved => SolveStatus::Suboptimal,
        SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
            SolveStatus::Infeasible
        }
        SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
            SolveStatus::Unbounded
        }
        SolverStatus::MaxIterations | SolverStatus::MaxTime => SolveStatus::IterationLimit,
        _ => SolveStatus::NumericalError,
    }
}

impl ProgramSolver for ClarabelSolver {
    fn solve(&self, program: &Program) -> Result<ProgramSolution> {
        let n = program.num_vars();
        let mut form = ConicForm::from_program(program);
        let a_mat = form.a_mat();
        let p_mat = p_mat(program);
        let cones = form.cones();

        log::trace!(
            "clarabel: {} variables, {} equalities, {} inequalities",
            n,
            form.n_eq,
            form.n_ineq
        );

        let settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .max_iter(self.max_iter)
            .tol_feas(self.tol_feas)
            .tol_gap_abs(self.tol_gap)
            .tol_gap_rel(self.tol_gap)
            .build()
            .map_err(|e| ReductionError::Solver(format!("clarabel settings: {:?}", e)))?;

        let mut solver =
            DefaultSolver::new(&p_mat, &program.linear, &a_mat, &form.b, &cones, settings)
                .map_err(|e| ReductionError::Solver(format!("clarabel setup: {:?}", e)))?;
        solver.solve();

        let sol = &solver.solution;
        let status = map_status(&sol.status);
        let x = if sol.x.len() == n {
            sol.x.clone()
        } else {
            vec![0.0; n]
        };
        Ok(ProgramSolution {
            status,
            objective: program.objective_value(&x),
            x,
            iterations: sol.iterations as usize,
        })
    }
}
