use crate::dc::FlowBranch;
use crate::debug::format_f64_vec;
use crate::error::{ReductionError, Result, Warning};
use crate::factor::factorize;
use crate::opt::ReduceOpt;
use crate::traits::Factorization;
use crate::transaction::Transaction;
use nalgebra::DVector;
use rayon::prelude::*;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;

/// One row of the PTDF table handed to the exporter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PtdfEntry {
    pub transaction: Transaction,
    /// Index into the flow branch list.
    pub branch: usize,
    pub value: f64,
}

/// Single-injection PTDF set for one network and one computational slack.
///
/// Column `k` holds the change in flow on every branch for a unit injection
/// at bus `k` withdrawn at the slack. The factorization of the slack-reduced
/// susceptance matrix is computed once and kept for further solves.
pub struct InjectionPtdf {
    /// External bus id at each position.
    bus_ids: Vec<usize>,
    pos: HashMap<usize, usize>,
    slack: usize,
    branches: Vec<FlowBranch>,
    /// vectors[bus][branch]
    vectors: Vec<Vec<f64>>,
    factor: Box<dyn Factorization>,
}

/// Removes row and column `slack` from `b_bus`, keeping it sparse.
fn reduced_susceptance(b_bus: &CsMat<f64>, slack: usize) -> CsMat<f64> {
    let n = b_bus.rows();
    let noslack = |i: usize| if i < slack { i } else { i - 1 };

    let mut b_red = TriMat::with_capacity((n - 1, n - 1), b_bus.nnz());
    for (&b, (i, j)) in b_bus.iter() {
        if i != slack && j != slack {
            b_red.add_triplet(noslack(i), noslack(j), b);
        }
    }
    b_red.to_csr()
}

/// Solves the slack-reduced system for the given full-length injection
/// vector and returns the full angle vector with the slack angle at zero.
fn solve_angles(factor: &dyn Factorization, slack: usize, p: &[f64]) -> Result<Vec<f64>> {
    let rhs = DVector::from_iterator(
        p.len() - 1,
        p.iter()
            .enumerate()
            .filter(|&(i, _)| i != slack)
            .map(|(_, &v)| v),
    );
    let theta_noslack = factor.solve(&rhs)?;

    let mut theta = Vec::with_capacity(p.len());
    theta.extend(theta_noslack.iter().take(slack));
    theta.push(0.0);
    theta.extend(theta_noslack.iter().skip(slack));
    Ok(theta)
}

fn branch_flows(branches: &[FlowBranch], theta: &[f64]) -> Vec<f64> {
    branches
        .iter()
        .map(|br| br.b * (theta[br.from] - theta[br.to]))
        .collect()
}

/// Builds the single-injection DC PTDF set.
///
/// `bus_ids` gives the external id of every row of `b_bus`; `slack` is a
/// position in that list. Branch flow sensitivities are evaluated for the
/// given flow branches in the order supplied. A singular slack-reduced
/// matrix (islanded network) is handled with a pseudoinverse and reported
/// in the returned warnings.
pub fn make_ptdf(
    b_bus: &CsMat<f64>,
    bus_ids: &[usize],
    branches: Vec<FlowBranch>,
    slack: usize,
    opt: &ReduceOpt,
) -> Result<(InjectionPtdf, Vec<Warning>)> {
    let nb = b_bus.rows();
    if nb != bus_ids.len() || b_bus.cols() != nb {
        return Err(ReductionError::InvalidTopology(format!(
            "susceptance matrix is {}x{} for {} buses",
            b_bus.rows(),
            b_bus.cols(),
            bus_ids.len()
        )));
    }
    if slack >= nb {
        return Err(ReductionError::InvalidTopology(format!(
            "slack position {} out of range for {} buses",
            slack, nb
        )));
    }
    if let Some(br) = branches.iter().find(|br| br.from >= nb || br.to >= nb) {
        return Err(ReductionError::InvalidTopology(format!(
            "flow branch {}-{} outside {} buses",
            br.from, br.to, nb
        )));
    }

    log::debug!(
        "PTDF: {} buses, {} branches, slack bus {}",
        nb,
        branches.len(),
        bus_ids[slack]
    );

    let mut warnings = Vec::new();
    let (factor, warning) = factorize(
        &reduced_susceptance(b_bus, slack),
        "slack-reduced susceptance matrix",
        opt.singular_tolerance,
        opt.pinv_tolerance,
    )?;
    warnings.extend(warning);

    let vectors = (0..nb)
        .into_par_iter()
        .map(|k| {
            if k == slack {
                return Ok(vec![0.0; branches.len()]);
            }
            let mut p = vec![0.0; nb];
            p[k] = 1.0;
            let theta = solve_angles(factor.as_ref(), slack, &p)?;
            Ok(branch_flows(&branches, &theta))
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    if log::log_enabled!(log::Level::Trace) {
        for (k, v) in vectors.iter().enumerate() {
            log::trace!("PTDF[{}]: {}", bus_ids[k], format_f64_vec(v));
        }
    }

    let pos = bus_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    Ok((
        InjectionPtdf {
            bus_ids: bus_ids.to_vec(),
            pos,
            slack,
            branches,
            vectors,
            factor,
        },
        warnings,
    ))
}

impl InjectionPtdf {
    pub fn nb(&self) -> usize {
        self.bus_ids.len()
    }

    pub fn nbr(&self) -> usize {
        self.branches.len()
    }

    pub fn bus_ids(&self) -> &[usize] {
        &self.bus_ids
    }

    pub fn slack_id(&self) -> usize {
        self.bus_ids[self.slack]
    }

    pub fn branches(&self) -> &[FlowBranch] {
        &self.branches
    }

    /// Position of an external bus id.
    pub fn position(&self, id: usize) -> Result<usize> {
        self.pos
            .get(&id)
            .copied()
            .ok_or(ReductionError::UnknownBus(id))
    }

    /// External ids of the end-points of flow branch `l`.
    pub fn branch_ids(&self, l: usize) -> (usize, usize) {
        let br = &self.branches[l];
        (self.bus_ids[br.from], self.bus_ids[br.to])
    }

    /// Single-injection vector for the bus at position `k`.
    pub fn injection(&self, k: usize) -> &[f64] {
        &self.vectors[k]
    }

    /// PTDF of a transfer between two bus positions, by superposition.
    pub(crate) fn transfer(&self, from: usize, to: usize) -> Vec<f64> {
        self.vectors[from]
            .iter()
            .zip(&self.vectors[to])
            .map(|(f, t)| f - t)
            .collect()
    }

    /// PTDF of a transaction on every branch: the injection vector of `a`
    /// minus that of `b`.
    pub fn transaction(&self, t: &Transaction) -> Result<Vec<f64>> {
        if t.a == t.b {
            return Err(ReductionError::InvalidTransaction(t.a));
        }
        Ok(self.transfer(self.position(t.a)?, self.position(t.b)?))
    }

    /// All canonical transactions between the buses of this network.
    pub fn transactions(&self) -> Vec<Transaction> {
        Transaction::all(&self.bus_ids)
    }

    /// Branch flows for an arbitrary injection vector, solved against the
    /// cached factorization.
    #[cfg(test)]
    pub(crate) fn flows(&self, p: &[f64]) -> Result<Vec<f64>> {
        if p.len() != self.nb() {
            return Err(ReductionError::InvalidTopology(format!(
                "injection vector has {} entries for {} buses",
                p.len(),
                self.nb()
            )));
        }
        let theta = solve_angles(self.factor.as_ref(), self.slack, p)?;
        Ok(branch_flows(&self.branches, &theta))
    }

    /// PTDF table entries with `|value| > eps`, transaction by transaction.
    pub fn entries(&self, eps: f64) -> impl Iterator<Item = PtdfEntry> + '_ {
        self.transactions().into_iter().flat_map(move |t| {
            let (a, b) = (self.pos[&t.a], self.pos[&t.b]);
            self.transfer(a, b)
                .into_iter()
                .enumerate()
                .filter(move |(_, v)| v.abs() > eps)
                .map(move |(branch, value)| PtdfEntry {
                    transaction: t,
                    branch,
                    value,
                })
        })
    }
}

/// Computes the PTDF of a single transfer by factoring the slack-reduced
/// susceptance matrix afresh and solving for `+1` at `from`, `-1` at `to`.
///
/// Reference implementation for cross-checking the superposition in
/// [`InjectionPtdf::transaction`]; one factorization per call.
pub fn direct_transfer_ptdf(
    b_bus: &CsMat<f64>,
    branches: &[FlowBranch],
    slack: usize,
    from: usize,
    to: usize,
    opt: &ReduceOpt,
) -> Result<Vec<f64>> {
    if from == to {
        return Err(ReductionError::InvalidTransaction(from));
    }
    let nb = b_bus.rows();
    let (factor, _) = factorize(
        &reduced_susceptance(b_bus, slack),
        "slack-reduced susceptance matrix",
        opt.singular_tolerance,
        opt.pinv_tolerance,
    )?;

    let mut p = vec![0.0; nb];
    p[from] = 1.0;
    p[to] = -1.0;
    let theta = solve_angles(factor.as_ref(), slack, &p)?;
    Ok(branch_flows(branches, &theta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dc::{make_b_dc, network_flow_branches};
    use crate::network::{Branch, Bus};
    use crate::ybus::make_ybus;

    fn five_bus() -> (Vec<Bus>, Vec<Branch>) {
        let bus = (1..=5).map(|i| Bus::new(i, "A")).collect();
        let branch = vec![
            Branch::new(1, 2, 0.01, 0.06, 1.0),
            Branch::new(1, 3, 0.05, 0.19, 1.0),
            Branch::new(2, 3, 0.06, 0.17, 1.0),
            Branch::new(2, 4, 0.05, 0.2, 1.0),
            Branch::new(3, 4, 0.01, 0.04, 1.0),
            Branch::new(4, 5, 0.02, 0.1, 1.0),
            Branch::new(2, 5, 0.06, 0.3, 1.0),
        ];
        (bus, branch)
    }

    fn setup(slack: usize) -> (CsMat<f64>, Vec<FlowBranch>, InjectionPtdf) {
        let (bus, branch) = five_bus();
        let b_bus = make_b_dc(&make_ybus(&bus, &branch));
        let (flow, _) = network_flow_branches(&branch, 1e-9);
        let ids = (1..=5).collect::<Vec<usize>>();
        let (ptdf, warnings) =
            make_ptdf(&b_bus, &ids, flow.clone(), slack, &ReduceOpt::default()).unwrap();
        assert!(warnings.is_empty());
        (b_bus, flow, ptdf)
    }

    #[test]
    fn slack_injection_is_zero() {
        let (_, _, ptdf) = setup(2);
        assert!(ptdf.injection(2).iter().all(|v| *v == 0.0));
        assert_eq!(ptdf.slack_id(), 3);
    }

    #[test]
    fn superposition_matches_direct_solve() {
        let (b_bus, flow, ptdf) = setup(0);
        let opt = ReduceOpt::default();
        for t in ptdf.transactions() {
            let sup = ptdf.transaction(&t).unwrap();
            let direct =
                direct_transfer_ptdf(&b_bus, &flow, 0, t.a - 1, t.b - 1, &opt).unwrap();
            for (s, d) in sup.iter().zip(&direct) {
                assert!((s - d).abs() < 1e-10, "{}: {} != {}", t, s, d);
            }
        }
    }

    #[test]
    fn transaction_ptdf_is_slack_independent() {
        let (_, _, p0) = setup(0);
        let (_, _, p4) = setup(4);
        for t in p0.transactions() {
            let v0 = p0.transaction(&t).unwrap();
            let v4 = p4.transaction(&t).unwrap();
            for (a, b) in v0.iter().zip(&v4) {
                assert!((a - b).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn transfer_is_conserved_at_source() {
        // Flows leaving bus 1 sum to the unit transfer.
        let (_, flow, ptdf) = setup(0);
        let v = ptdf.transaction(&Transaction::new(1, 5).unwrap()).unwrap();
        let out: f64 = flow
            .iter()
            .zip(&v)
            .map(|(br, f)| match (br.from, br.to) {
                (0, _) => *f,
                (_, 0) => -*f,
                _ => 0.0,
            })
            .sum();
        assert!((out - 1.0).abs() < 1e-10);
    }

    #[test]
    fn flows_agree_with_superposition() {
        let (_, _, ptdf) = setup(1);
        let p = [0.0, 0.0, 1.0, 0.0, -1.0];
        let flows = ptdf.flows(&p).unwrap();
        let v = ptdf.transaction(&Transaction::new(3, 5).unwrap()).unwrap();
        for (a, b) in flows.iter().zip(&v) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn self_transaction_is_rejected() {
        let (_, _, ptdf) = setup(0);
        let t = Transaction { a: 2, b: 2 };
        assert!(matches!(
            ptdf.transaction(&t),
            Err(ReductionError::InvalidTransaction(2))
        ));
    }

    #[test]
    fn entries_skip_small_values() {
        let (_, _, ptdf) = setup(0);
        let eps = 1e-6;
        let entries = ptdf.entries(eps).collect::<Vec<PtdfEntry>>();
        assert!(entries.iter().all(|e| e.value.abs() > eps));
        assert!(entries.len() <= ptdf.transactions().len() * ptdf.nbr());
        assert!(!entries.is_empty());
    }

    #[test]
    fn islanded_network_uses_pseudoinverse() {
        let bus = (1..=4).map(|i| Bus::new(i, "A")).collect::<Vec<Bus>>();
        let branch = vec![
            Branch::new(1, 2, 0.0, 0.1, 1.0),
            Branch::new(3, 4, 0.0, 0.2, 1.0),
        ];
        let b_bus = make_b_dc(&make_ybus(&bus, &branch));
        let (flow, _) = network_flow_branches(&branch, 1e-9);
        let (ptdf, warnings) =
            make_ptdf(&b_bus, &[1, 2, 3, 4], flow, 0, &ReduceOpt::default()).unwrap();
        assert!(matches!(
            warnings.as_slice(),
            [Warning::SingularMatrix { .. }]
        ));

        // A transfer inside either island still crosses its one branch.
        let v = ptdf.transaction(&Transaction::new(1, 2).unwrap()).unwrap();
        assert!((v[0] - 1.0).abs() < 1e-9 && v[1].abs() < 1e-9);
        let v = ptdf.transaction(&Transaction::new(3, 4).unwrap()).unwrap();
        assert!(v[0].abs() < 1e-9 && (v[1] - 1.0).abs() < 1e-9);
    }
}
