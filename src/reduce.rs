use crate::dc::{make_b_dc, matrix_flow_branches, network_flow_branches};
use crate::error::{ReductionError, Result, Warning};
use crate::fit::{fit_capacities, CapacityFit, FitIndex};
use crate::kron::{kron_reduce, KronReduction};
use crate::math::norm_inf;
use crate::network::Network;
use crate::opt::ReduceOpt;
use crate::ptdf::{make_ptdf, InjectionPtdf};
use crate::select::select_representatives;
use crate::traits::ProgramSolver;
use crate::transaction::Transaction;
use crate::ttc::{evaluate_ttc, TtcRecord};
use crate::ybus::make_ybus;
use num_complex::Complex64;
use sprs::CsMat;
use std::collections::HashMap;

/// PTDF set, branch ratings and TTCs of one network.
pub struct Sensitivity {
    pub ptdf: InjectionPtdf,
    /// Thermal rating of every flow branch of `ptdf` (p.u.).
    pub capacity: Vec<f64>,
    pub ttc: Vec<TtcRecord>,
}

/// Original, fitted and reduced TTC of one representative transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TtcComparison {
    pub transaction: Transaction,
    pub original: Option<f64>,
    /// TTC_eq chosen by the capacity fit. `None` when the transaction was
    /// not fitted.
    pub fitted: Option<f64>,
    /// TTC recomputed on the reduced network with the fitted capacities.
    pub reduced: Option<f64>,
    /// `|reduced - original| / original`.
    pub relative_error: Option<f64>,
}

/// Everything produced by one reduction run.
pub struct Reduction {
    pub y_bus: CsMat<Complex64>,
    /// Representative bus ids in zone label order.
    pub representatives: Vec<usize>,
    pub original: Sensitivity,
    pub kron: KronReduction,
    pub reduced: Sensitivity,
    pub fit: CapacityFit,
    pub comparison: Vec<TtcComparison>,
    pub warnings: Vec<Warning>,
}

fn slack_position(bus_ids: &[usize], opt: &ReduceOpt) -> Result<usize> {
    match opt.slack_bus {
        None => Ok(0),
        Some(id) => bus_ids
            .iter()
            .position(|&b| b == id)
            .ok_or(ReductionError::UnknownBus(id)),
    }
}

/// PTDFs and TTCs of the network as given, one flow branch per input
/// branch with non-negligible susceptance.
pub fn network_sensitivity(
    network: &Network,
    y_bus: &CsMat<Complex64>,
    opt: &ReduceOpt,
) -> Result<(Sensitivity, Vec<Warning>)> {
    let b_bus = make_b_dc(y_bus);
    let (flow, index) = network_flow_branches(&network.branch, opt.susceptance_tolerance);
    let capacity = index
        .iter()
        .map(|&l| network.branch[l].capacity)
        .collect::<Vec<f64>>();

    let bus_ids = network.bus.iter().map(|b| b.id).collect::<Vec<usize>>();
    let slack = slack_position(&bus_ids, opt)?;
    let (ptdf, warnings) = make_ptdf(&b_bus, &bus_ids, flow, slack, opt)?;
    let ttc = evaluate_ttc(&ptdf, &capacity, opt.ptdf_epsilon)?;

    Ok((
        Sensitivity {
            ptdf,
            capacity,
            ttc,
        },
        warnings,
    ))
}

/// PTDF set of a Kron-reduced network. Flow branches follow the nonzero
/// pattern of its susceptance matrix. The slack is `opt.slack_bus` when it
/// was retained, otherwise the first representative.
fn reduced_ptdf(kron: &KronReduction, opt: &ReduceOpt) -> Result<(InjectionPtdf, Vec<Warning>)> {
    let b_red = make_b_dc(&kron.y_bus);
    let flow = matrix_flow_branches(&b_red, opt.susceptance_tolerance);
    let slack = slack_position(&kron.bus_ids, opt).unwrap_or(0);
    make_ptdf(&b_red, &kron.bus_ids, flow, slack, opt)
}

fn compare(original: &[TtcRecord], fit: &CapacityFit, reduced: &[TtcRecord]) -> Vec<TtcComparison> {
    let orig = original
        .iter()
        .map(|r| (r.transaction, r.value()))
        .collect::<HashMap<Transaction, Option<f64>>>();
    let fitted = fit
        .transactions
        .iter()
        .map(|t| (t.transaction, t.fitted))
        .collect::<HashMap<Transaction, f64>>();

    reduced
        .iter()
        .map(|r| {
            let original = orig.get(&r.transaction).copied().flatten();
            let reduced = r.value();
            let relative_error = match (original, reduced) {
                (Some(o), Some(red)) if o > 0.0 => Some((red - o).abs() / o),
                _ => None,
            };
            TtcComparison {
                transaction: r.transaction,
                original,
                fitted: fitted.get(&r.transaction).copied(),
                reduced,
                relative_error,
            }
        })
        .collect()
}

/// Reduces a zonal network to one bus per zone while preserving
/// inter-zonal transfer capacities.
///
/// Builds the admittance matrix, evaluates original PTDFs and TTCs, picks
/// one representative per zone (flagging it on `network`, which is left
/// untouched when the zone layout is rejected), Kron-reduces
/// onto the representatives and fits synthetic line capacities with the
/// formulation in `opt`. The reduced TTCs are then re-evaluated with the
/// fitted capacities.
pub fn reduce_network(
    network: &mut Network,
    opt: &ReduceOpt,
    solver: &dyn ProgramSolver,
) -> Result<Reduction> {
    opt.validate()?;
    network.validate()?;
    let zones = network.zones().len();
    if zones == network.nb() {
        return Err(ReductionError::InvalidTopology(
            "every bus is its zone's representative, nothing to reduce".to_string(),
        ));
    }
    if zones < 2 {
        return Err(ReductionError::InvalidTopology(format!(
            "{} zone(s) leave no inter-zonal transactions",
            zones
        )));
    }
    log::info!(
        "reducing network: {} buses, {} branches, {} zones",
        network.nb(),
        network.nl(),
        zones
    );
    let mut warnings = Vec::new();

    let y_bus = make_ybus(&network.bus, &network.branch);
    let (original, w) = network_sensitivity(network, &y_bus, opt)?;
    warnings.extend(w);
    log::info!("original network: {} transactions", original.ttc.len());

    let b_bus = make_b_dc(&y_bus);
    let representatives =
        select_representatives(&mut network.bus, &b_bus, opt.susceptance_tolerance)?;

    let (kron, w) = kron_reduce(&y_bus, &representatives, opt)?;
    warnings.extend(w);

    let (ptdf_red, w) = reduced_ptdf(&kron, opt)?;
    warnings.extend(w);
    log::info!(
        "reduced network: {} buses, {} synthetic branches",
        ptdf_red.nb(),
        ptdf_red.nbr()
    );

    let index = FitIndex::new(&ptdf_red, &original.ttc, opt.ptdf_epsilon)?;
    let fit = fit_capacities(&index, opt, solver)?;
    warnings.extend(fit.warnings.iter().cloned());

    let capacity = index.branch_capacities(&fit.capacities());
    let ttc_red = evaluate_ttc(&ptdf_red, &capacity, opt.ptdf_epsilon)?;
    let comparison = compare(&original.ttc, &fit, &ttc_red);

    let errors = comparison
        .iter()
        .filter_map(|c| c.relative_error)
        .collect::<Vec<f64>>();
    if !errors.is_empty() {
        log::info!("largest relative TTC error: {:.4}", norm_inf(&errors));
    }

    Ok(Reduction {
        y_bus,
        representatives,
        original,
        kron,
        reduced: Sensitivity {
            ptdf: ptdf_red,
            capacity,
            ttc: ttc_red,
        },
        fit,
        comparison,
        warnings,
    })
}
