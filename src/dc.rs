use crate::network::Branch;
use num_complex::Complex64;
use sprs::{CsMat, TriMat};

/// FlowBranch is a branch as seen by the DC sensitivity model: two bus
/// indices (zero-based) and the susceptance `b` such that the flow from
/// `from` to `to` is `b * (theta_from - theta_to)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowBranch {
    pub from: usize,
    pub to: usize,
    pub b: f64,
}

/// Builds the DC susceptance matrix `B = -Im(Y)`.
///
/// The bus real power injections are related to bus voltage angles by
/// ```text
/// P = B * Va
/// ```
/// Off-diagonal entries are `-b_ij`, diagonals the sum of incident
/// susceptances plus any shunt susceptance held in `Y`.
pub fn make_b_dc(y_bus: &CsMat<Complex64>) -> CsMat<f64> {
    let n = y_bus.rows();
    let mut b_bus = TriMat::with_capacity((n, n), y_bus.nnz());
    for (y, (i, j)) in y_bus.iter() {
        let b = -y.im;
        if b != 0.0 {
            b_bus.add_triplet(i, j, b);
        }
    }
    b_bus.to_csr()
}

/// Flow branches of a network defined by its branch list, in input order.
///
/// Each branch keeps its own series susceptance so that parallel circuits
/// are rated separately. Branches with `|b|` at or below `tol` are left out
/// altogether. The returned index vector maps each flow branch back to its
/// position in `branch`.
pub fn network_flow_branches(branch: &[Branch], tol: f64) -> (Vec<FlowBranch>, Vec<usize>) {
    let mut flow = Vec::with_capacity(branch.len());
    let mut index = Vec::with_capacity(branch.len());
    for (l, br) in branch.iter().enumerate() {
        let b = br.b_s();
        if b.abs() > tol {
            flow.push(FlowBranch {
                from: br.from - 1,
                to: br.to - 1,
                b,
            });
            index.push(l);
        } else {
            log::debug!(
                "branch {} ({}-{}) dropped: |b| = {:e} below tolerance",
                l,
                br.from,
                br.to,
                b.abs()
            );
        }
    }
    (flow, index)
}

/// Flow branches implied by the nonzero off-diagonal pattern of `B`.
///
/// Used for Kron-reduced networks where the branch list no longer exists.
/// Branches are enumerated over the upper triangle in row-major order with
/// `from < to` and `b = -B[from, to]`.
pub fn matrix_flow_branches(b_bus: &CsMat<f64>, tol: f64) -> Vec<FlowBranch> {
    let mut flow = Vec::new();
    for (i, row) in b_bus.outer_iterator().enumerate() {
        let mut entries = row
            .iter()
            .filter(|&(j, _)| j > i)
            .map(|(j, &b)| (j, -b))
            .collect::<Vec<(usize, f64)>>();
        entries.sort_by_key(|&(j, _)| j);
        for (j, b) in entries {
            if b.abs() > tol {
                flow.push(FlowBranch { from: i, to: j, b });
            }
        }
    }
    flow
}

/// Network degree of every bus: the number of other buses `j` with
/// `|B_ij| > tol`.
pub fn bus_degrees(b_bus: &CsMat<f64>, tol: f64) -> Vec<usize> {
    b_bus
        .outer_iterator()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .filter(|&(j, b)| j != i && b.abs() > tol)
                .count()
        })
        .collect()
}
