use crate::error::ReductionError;
use derive_builder::Builder;
use std::fmt;
use std::str::FromStr;

/// Capacity fitting formulation.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Formulation {
    /// Least-squares TTC match with capacity regularization.
    QP,
    /// Least-squares match with one binding line chosen per transaction.
    MIQP,
    /// Maximize total TTC without exceeding the original TTCs.
    LP,
}

impl fmt::Display for Formulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Formulation::QP => "QP",
            Formulation::MIQP => "MIQP",
            Formulation::LP => "LP",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Formulation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qp" => Ok(Formulation::QP),
            "miqp" => Ok(Formulation::MIQP),
            "lp" => Ok(Formulation::LP),
            _ => Err(format!("unknown formulation {:?}, expected qp, miqp or lp", s)),
        }
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct SolverOpt {
    /// Maximum interior-point iterations per continuous solve.
    pub max_iter: u32,

    /// Primal and dual feasibility tolerance of the interior-point solver.
    pub tol_feas: f64,

    /// Absolute and relative duality gap tolerance of the interior-point
    /// solver.
    pub tol_gap: f64,

    /// Maximum branch-and-bound nodes for programs with binary variables.
    pub node_limit: usize,

    /// Distance from 0 or 1 within which a relaxed binary counts as integral.
    pub integrality_tolerance: f64,

    /// Relative gap below which branch-and-bound nodes are pruned.
    pub mip_gap: f64,
}

impl Default for SolverOpt {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tol_feas: 1e-8,
            tol_gap: 1e-8,
            node_limit: 10_000,
            integrality_tolerance: 1e-6,
            mip_gap: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct ReduceOpt {
    /// Capacity fitting formulation.
    pub formulation: Formulation,

    /// Weight of the capacity regularization term in the QP and MIQP
    /// objectives. Default value is 1e-4.
    pub lambda: f64,

    /// PTDF magnitudes at or below this value are treated as zero.
    /// Default value is 1e-6.
    pub ptdf_epsilon: f64,

    /// System MVA base. Default value is 100.
    pub base_mva: f64,

    /// Susceptances at or below this magnitude do not form a branch.
    pub susceptance_tolerance: f64,

    /// Computational slack bus id. The first bus is used by default.
    #[builder(setter(strip_option))]
    pub slack_bus: Option<usize>,

    /// Pivot ratio below which a matrix is treated as singular.
    pub singular_tolerance: f64,

    /// Singular value cut-off for pseudoinverses.
    pub pinv_tolerance: f64,

    /// Safety factor applied to the big-M constant that bounds fitted
    /// capacities in the LP and MIQP. Must be at least 1.
    pub big_m_factor: f64,

    pub solver: SolverOpt,
}

impl Default for ReduceOpt {
    fn default() -> Self {
        Self {
            formulation: Formulation::QP,
            lambda: 1e-4,
            ptdf_epsilon: 1e-6,
            base_mva: 100.0,
            susceptance_tolerance: 1e-9,
            slack_bus: None,
            singular_tolerance: 1e-12,
            pinv_tolerance: 1e-10,
            big_m_factor: 10.0,
            solver: SolverOpt::default(),
        }
    }
}

impl ReduceOpt {
    /// Rejects option values that no formulation can work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.big_m_factor.is_nan() || self.big_m_factor < 1.0 {
            return Err(ReductionError::InvalidOption(format!(
                "big_m_factor must be at least 1, got {}",
                self.big_m_factor
            )));
        }
        if self.lambda.is_nan() || self.lambda < 0.0 {
            return Err(ReductionError::InvalidOption(format!(
                "lambda must be non-negative, got {}",
                self.lambda
            )));
        }
        if self.ptdf_epsilon.is_nan() || self.ptdf_epsilon < 0.0 {
            return Err(ReductionError::InvalidOption(format!(
                "ptdf_epsilon must be non-negative, got {}",
                self.ptdf_epsilon
            )));
        }
        Ok(())
    }
}
