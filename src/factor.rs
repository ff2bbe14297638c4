use crate::error::{ReductionError, Result, Warning};
use crate::traits::Factorization;
use nalgebra::linalg::LU;
use nalgebra::{ComplexField, DMatrix, DVector, Dyn};
use sprs::{CsMat, FillInReduction, SymmetryCheck, TriMat};
use sprs_ldl::{Ldl, LdlNumeric};

/// Sparse LDL' factors of a symmetric matrix under a reverse Cuthill-McKee
/// ordering.
pub struct SparseLdl {
    ldl: LdlNumeric<f64, usize>,
    n: usize,
}

impl SparseLdl {
    fn new(a: &CsMat<f64>) -> std::result::Result<Self, String> {
        let ldl = Ldl::new()
            .check_symmetry(SymmetryCheck::DontCheckSymmetry)
            .fill_in_reduction(FillInReduction::ReverseCuthillMcKee)
            .numeric(a.view())
            .map_err(|e| e.to_string())?;
        Ok(Self { ldl, n: a.rows() })
    }

    /// Largest deviation from the all-ones vector when solving against
    /// `a * 1`. Grows with the condition number of `a`.
    fn ones_error(&self, a: &CsMat<f64>) -> f64 {
        let mut rhs = vec![0.0; self.n];
        for (&v, (i, _)) in a.iter() {
            rhs[i] += v;
        }
        let x: Vec<f64> = self.ldl.solve(rhs.as_slice());
        x.iter()
            .map(|v| (v - 1.0).abs())
            .fold(0.0_f64, |m, e| if e.is_nan() { f64::INFINITY } else { m.max(e) })
    }
}

impl Factorization for SparseLdl {
    fn dim(&self) -> usize {
        self.n
    }

    fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let x: Vec<f64> = self.ldl.solve(rhs.as_slice());
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ReductionError::Factorization(
                "LDL solve produced non-finite values".to_string(),
            ));
        }
        Ok(DVector::from_vec(x))
    }
}

/// Moore-Penrose pseudoinverse, used when the matrix is singular.
pub struct PseudoInverse {
    pinv: DMatrix<f64>,
}

impl Factorization for PseudoInverse {
    fn dim(&self) -> usize {
        self.pinv.nrows()
    }

    fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        Ok(&self.pinv * rhs)
    }
}

/// Reciprocal condition estimate from the pivots of an LU factorization:
/// `min |u_ii| / max |u_ii|`. Zero for an exactly singular matrix.
pub(crate) fn pivot_rcond<T>(lu: &LU<T, Dyn, Dyn>) -> f64
where
    T: ComplexField<RealField = f64>,
{
    let u = lu.u();
    let (mut min, mut max) = (f64::INFINITY, 0.0_f64);
    for v in u.diagonal().iter() {
        let m = v.clone().modulus();
        min = min.min(m);
        max = max.max(m);
    }
    if max == 0.0 || !min.is_finite() {
        0.0
    } else {
        min / max
    }
}

/// Smallest `max |row sum| / max row 1-norm` over the connected components
/// of the sparsity graph of `a`.
///
/// An island of a Laplacian-like matrix has every row summing to zero, so
/// the indicator vector of that island is in the null space and the ratio
/// drops to rounding level.
pub(crate) fn island_balance(a: &CsMat<f64>) -> f64 {
    let n = a.rows();
    let mut row_sum = vec![0.0_f64; n];
    let mut row_abs = vec![0.0_f64; n];
    let mut adj = vec![Vec::new(); n];
    for (&v, (i, j)) in a.iter() {
        row_sum[i] += v;
        row_abs[i] += v.abs();
        if i != j && v != 0.0 {
            adj[i].push(j);
            adj[j].push(i);
        }
    }

    let mut seen = vec![false; n];
    let mut worst = f64::INFINITY;
    for start in 0..n {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut stack = vec![start];
        let (mut sum, mut norm) = (0.0_f64, 0.0_f64);
        while let Some(i) = stack.pop() {
            sum = sum.max(row_sum[i].abs());
            norm = norm.max(row_abs[i]);
            for &j in &adj[i] {
                if !seen[j] {
                    seen[j] = true;
                    stack.push(j);
                }
            }
        }
        worst = worst.min(if norm > 0.0 { sum / norm } else { 0.0 });
    }
    worst
}

/// `(A + A') / 2`
fn symmetric_part(a: &CsMat<f64>) -> CsMat<f64> {
    let mut t = TriMat::with_capacity((a.rows(), a.cols()), 2 * a.nnz());
    for (&v, (i, j)) in a.iter() {
        t.add_triplet(i, j, 0.5 * v);
        t.add_triplet(j, i, 0.5 * v);
    }
    t.to_csr()
}

fn to_dense(a: &CsMat<f64>) -> DMatrix<f64> {
    let mut d = DMatrix::<f64>::zeros(a.rows(), a.cols());
    for (&v, (i, j)) in a.iter() {
        d[(i, j)] += v;
    }
    d
}

/// Factors the symmetric sparse matrix `a` once for repeated solves.
///
/// A sparse LDL' factorization is used unless `a` has an island whose rows
/// balance to zero (balance below `singular_tol`), the factorization hits a
/// zero pivot, or solving against `a * 1` misses by more than
/// `sqrt(singular_tol)`. In those cases the dense pseudoinverse is
/// computed instead and a `Warning::SingularMatrix` naming `context` is
/// returned.
pub fn factorize(
    a: &CsMat<f64>,
    context: &str,
    singular_tol: f64,
    pinv_tol: f64,
) -> Result<(Box<dyn Factorization>, Option<Warning>)> {
    if a.rows() != a.cols() {
        return Err(ReductionError::Factorization(format!(
            "{} must be square, got {}x{}",
            context,
            a.rows(),
            a.cols()
        )));
    }
    if a.rows() == 0 {
        return Ok((
            Box::new(PseudoInverse {
                pinv: DMatrix::zeros(0, 0),
            }),
            None,
        ));
    }

    // Kron-reduced matrices are symmetric only up to rounding.
    let sym = symmetric_part(a);
    let scale = a.iter().fold(0.0_f64, |m, (v, _)| m.max(v.abs()));
    let skew = a.iter().fold(0.0_f64, |m, (&v, (i, j))| {
        m.max((v - sym.get(i, j).copied().unwrap_or(0.0)).abs())
    });
    if skew > singular_tol.sqrt() * scale {
        return Err(ReductionError::Factorization(format!(
            "{} must be symmetric, entries differ by {:e}",
            context, skew
        )));
    }
    let a = &sym;

    let balance = island_balance(a);
    log::debug!(
        "{}: order {}, {} nonzeros, island balance {:e}",
        context,
        a.rows(),
        a.nnz(),
        balance
    );

    let rcond = if balance < singular_tol {
        balance
    } else {
        match SparseLdl::new(a) {
            Ok(ldl) => {
                let err = ldl.ones_error(a);
                if err <= singular_tol.sqrt() {
                    return Ok((Box::new(ldl), None));
                }
                log::debug!("{}: LDL solve check missed by {:e}", context, err);
                f64::EPSILON / err
            }
            Err(e) => {
                log::debug!("{}: LDL factorization failed: {}", context, e);
                0.0
            }
        }
    };

    let pinv = to_dense(a)
        .pseudo_inverse(pinv_tol)
        .map_err(|e| ReductionError::Factorization(format!("{}: {}", context, e)))?;
    let warning = Warning::SingularMatrix {
        context: context.to_string(),
        rcond,
    }
    .log();
    Ok((Box::new(PseudoInverse { pinv }), Some(warning)))
}
