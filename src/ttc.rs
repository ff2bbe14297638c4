use crate::error::{ReductionError, Result};
use crate::ptdf::InjectionPtdf;
use crate::transaction::Transaction;
use rayon::prelude::*;

/// Result of a transfer capacity evaluation for one transaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TtcOutcome {
    /// TTC limited by the thermal rating of `branch`.
    Limited { value: f64, branch: usize },
    /// No branch has `|PTDF|` above epsilon; the transfer is not limited by
    /// any modelled branch.
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TtcRecord {
    pub transaction: Transaction,
    pub outcome: TtcOutcome,
}

impl TtcRecord {
    pub fn value(&self) -> Option<f64> {
        match self.outcome {
            TtcOutcome::Limited { value, .. } => Some(value),
            TtcOutcome::Unbounded => None,
        }
    }

    /// Index of the limiting flow branch.
    pub fn limiting_branch(&self) -> Option<usize> {
        match self.outcome {
            TtcOutcome::Limited { branch, .. } => Some(branch),
            TtcOutcome::Unbounded => None,
        }
    }
}

/// Total transfer capacity of one transaction.
///
/// `TTC = min capacity[l] / |ptdf[l]|` over branches with `|ptdf[l]| > eps`.
/// Branches are scanned in index order and only a strictly smaller ratio
/// replaces the current minimum, so exact ties go to the lowest index.
pub fn transfer_capacity(ptdf: &[f64], capacity: &[f64], eps: f64) -> TtcOutcome {
    let mut best = TtcOutcome::Unbounded;
    for (l, (&p, &cap)) in ptdf.iter().zip(capacity).enumerate() {
        if p.abs() <= eps {
            continue;
        }
        let ratio = cap / p.abs();
        match best {
            TtcOutcome::Limited { value, .. } if ratio >= value => {}
            _ => {
                best = TtcOutcome::Limited {
                    value: ratio,
                    branch: l,
                }
            }
        }
    }
    best
}

/// Evaluates the TTC of every canonical transaction of the network.
///
/// `capacity` is indexed like the flow branches of `ptdf`. Transactions are
/// evaluated in parallel; degenerate ones are reported as
/// [`TtcOutcome::Unbounded`] without interrupting the batch.
pub fn evaluate_ttc(ptdf: &InjectionPtdf, capacity: &[f64], eps: f64) -> Result<Vec<TtcRecord>> {
    if capacity.len() != ptdf.nbr() {
        return Err(ReductionError::InvalidTopology(format!(
            "{} capacities for {} branches",
            capacity.len(),
            ptdf.nbr()
        )));
    }
    let transactions = ptdf.transactions();
    log::debug!(
        "TTC: {} transactions over {} branches",
        transactions.len(),
        ptdf.nbr()
    );

    let records = transactions
        .par_iter()
        .map(|t| {
            let v = ptdf.transaction(t)?;
            Ok(TtcRecord {
                transaction: *t,
                outcome: transfer_capacity(&v, capacity, eps),
            })
        })
        .collect::<Result<Vec<TtcRecord>>>()?;

    let unbounded = records
        .iter()
        .filter(|r| r.outcome == TtcOutcome::Unbounded)
        .count();
    if unbounded > 0 {
        log::info!("TTC: {} of {} transactions unbounded", unbounded, records.len());
    }
    Ok(records)
}
