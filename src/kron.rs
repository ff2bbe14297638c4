use crate::debug::format_rect_vec;
use crate::error::{ReductionError, Result, Warning};
use crate::factor::pivot_rcond;
use crate::opt::ReduceOpt;
use nalgebra::DMatrix;
use num_complex::Complex64;
use num_traits::Zero;
use sprs::{CsMat, TriMat};
use std::collections::HashSet;

/// Admittance matrix of a Kron-reduced network.
#[derive(Debug, Clone)]
pub struct KronReduction {
    /// Ids of the retained buses, in the order they were supplied. Row `k`
    /// of `y_bus` belongs to `bus_ids[k]`.
    pub bus_ids: Vec<usize>,
    pub y_bus: CsMat<Complex64>,
}

enum Block {
    Kept(usize),
    Eliminated(usize),
}

/// Eliminates every bus not in `keep` from the admittance matrix.
///
/// With the buses permuted into `[kept | eliminated]` order the matrix is
/// partitioned as
///
/// ```text
/// | K   L' |
/// | L   M  |
/// ```
///
/// and the reduced matrix is `K - L' * M^-1 * L`. If `M` is singular, as
/// happens with radial or floating eliminated subnetworks, its pseudoinverse
/// is used and a warning returned. Eliminated buses leave no trace in the
/// result: flows on eliminated branches cannot be recovered from it.
///
/// `keep` must be non-empty with distinct ids in `1..=N`. Keeping every
/// bus eliminates nothing and returns `Y` permuted into `keep` order.
pub fn kron_reduce(
    y_bus: &CsMat<Complex64>,
    keep: &[usize],
    opt: &ReduceOpt,
) -> Result<(KronReduction, Vec<Warning>)> {
    let n = y_bus.rows();
    if keep.is_empty() {
        return Err(ReductionError::InvalidTopology(
            "representative set is empty".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(keep.len());
    for &id in keep {
        if id == 0 || id > n {
            return Err(ReductionError::InvalidTopology(format!(
                "representative bus {} not in network of {} buses",
                id, n
            )));
        }
        if !seen.insert(id) {
            return Err(ReductionError::InvalidTopology(format!(
                "representative bus {} listed twice",
                id
            )));
        }
    }

    let k = keep.len();
    let m = n - k;

    let mut block = (0..n).map(|_| None).collect::<Vec<Option<Block>>>();
    for (r, &id) in keep.iter().enumerate() {
        block[id - 1] = Some(Block::Kept(r));
    }
    let mut e = 0;
    for b in block.iter_mut().filter(|b| b.is_none()) {
        *b = Some(Block::Eliminated(e));
        e += 1;
    }

    let mut k_mat = DMatrix::<Complex64>::zeros(k, k);
    let mut lt_mat = DMatrix::<Complex64>::zeros(k, m);
    let mut l_mat = DMatrix::<Complex64>::zeros(m, k);
    let mut m_mat = DMatrix::<Complex64>::zeros(m, m);

    for (&y, (i, j)) in y_bus.iter() {
        match (&block[i], &block[j]) {
            (Some(Block::Kept(r)), Some(Block::Kept(c))) => k_mat[(*r, *c)] += y,
            (Some(Block::Kept(r)), Some(Block::Eliminated(c))) => lt_mat[(*r, *c)] += y,
            (Some(Block::Eliminated(r)), Some(Block::Kept(c))) => l_mat[(*r, *c)] += y,
            (Some(Block::Eliminated(r)), Some(Block::Eliminated(c))) => m_mat[(*r, *c)] += y,
            _ => unreachable!("every bus is assigned a block"),
        }
    }

    let mut warnings = Vec::new();
    let y_red = if m == 0 {
        log::debug!("Kron: all {} buses kept, nothing to eliminate", n);
        k_mat
    } else {
        log::debug!("Kron: keeping {} of {} buses, eliminating {}", k, n, m);

        let lu = m_mat.clone().lu();
        let rcond = pivot_rcond(&lu);
        let m_inv_l = if rcond >= opt.singular_tolerance {
            lu.solve(&l_mat).ok_or_else(|| {
                ReductionError::Factorization("LU solve of eliminated block failed".to_string())
            })?
        } else {
            warnings.push(
                Warning::SingularMatrix {
                    context: "eliminated block M".to_string(),
                    rcond,
                }
                .log(),
            );
            let m_pinv = m_mat
                .pseudo_inverse(opt.pinv_tolerance)
                .map_err(|e| ReductionError::Factorization(format!("eliminated block M: {}", e)))?;
            m_pinv * &l_mat
        };
        k_mat - lt_mat * m_inv_l
    };

    if log::log_enabled!(log::Level::Trace) {
        for (r, id) in keep.iter().enumerate() {
            let row = y_red.row(r).iter().copied().collect::<Vec<Complex64>>();
            log::trace!("Yred[{}]: {}", id, format_rect_vec(&row));
        }
    }

    let mut tri = TriMat::new((k, k));
    for c in 0..k {
        for r in 0..k {
            let y = y_red[(r, c)];
            if !y.is_zero() {
                tri.add_triplet(r, c, y);
            }
        }
    }

    Ok((
        KronReduction {
            bus_ids: keep.to_vec(),
            y_bus: tri.to_csr(),
        },
        warnings,
    ))
}
