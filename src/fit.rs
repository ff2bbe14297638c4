use crate::debug::format_f64;
use crate::error::{ReductionError, Result, Warning};
use crate::opt::{Formulation, ReduceOpt};
use crate::ptdf::InjectionPtdf;
use crate::solver::{Program, Sense, SolveStatus};
use crate::traits::ProgramSolver;
use crate::transaction::Transaction;
use crate::ttc::{TtcOutcome, TtcRecord};
use std::collections::HashMap;

/// SyntheticLine is a connection between two representatives of the
/// reduced network, keyed by `(min, max)` of their ids.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticLine {
    pub from: usize,
    pub to: usize,
    /// Fitted thermal rating (p.u.).
    pub capacity: f64,
}

/// Fitted transfer capacity of one representative transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedTtc {
    pub transaction: Transaction,
    /// TTC of the transaction in the original network.
    pub original: f64,
    /// TTC_eq chosen by the fit.
    pub fitted: f64,
    /// Index into the synthetic lines of the line selected as binding.
    /// Only the MIQP formulation selects one.
    pub binding: Option<usize>,
}

/// Output of a capacity fit.
#[derive(Debug, Clone)]
pub struct CapacityFit {
    pub formulation: Formulation,
    pub lines: Vec<SyntheticLine>,
    pub transactions: Vec<FittedTtc>,
    pub status: SolveStatus,
    pub objective: f64,
    pub warnings: Vec<Warning>,
}

/// Precomputation shared by all formulations.
///
/// Synthetic lines come from the flow branches of the reduced PTDF set,
/// deduplicated by unordered end-point pair. Each fitted transaction keeps
/// a sparse list of `(line, |PTDF|)` for the lines it loads above epsilon.
#[derive(Debug, Clone)]
pub struct FitIndex {
    lines: Vec<(usize, usize)>,
    /// Synthetic line of every reduced flow branch.
    branch_line: Vec<usize>,
    transactions: Vec<Transaction>,
    ttc_orig: Vec<f64>,
    candidates: Vec<Vec<(usize, f64)>>,
    warnings: Vec<Warning>,
}

impl FitIndex {
    /// Indexes the reduced network against the TTCs of the original one.
    ///
    /// `original` must hold a record for every pair of representatives.
    /// Transactions with an unbounded original TTC are left out of the fit
    /// with a [`Warning::UnfittedTransaction`].
    pub fn new(reduced: &InjectionPtdf, original: &[TtcRecord], eps: f64) -> Result<Self> {
        let mut lines = Vec::new();
        let mut line_pos: HashMap<(usize, usize), usize> = HashMap::new();
        let mut branch_line = Vec::with_capacity(reduced.nbr());
        for l in 0..reduced.nbr() {
            let (i, j) = reduced.branch_ids(l);
            let key = (i.min(j), i.max(j));
            let pos = *line_pos.entry(key).or_insert_with(|| {
                lines.push(key);
                lines.len() - 1
            });
            branch_line.push(pos);
        }

        let orig = original
            .iter()
            .map(|r| (r.transaction, r.outcome))
            .collect::<HashMap<Transaction, TtcOutcome>>();

        let mut transactions = Vec::new();
        let mut ttc_orig = Vec::new();
        let mut candidates = Vec::new();
        let mut warnings = Vec::new();

        for t in reduced.transactions() {
            let value = match orig.get(&t) {
                Some(TtcOutcome::Limited { value, .. }) => *value,
                Some(TtcOutcome::Unbounded) => {
                    warnings.push(Warning::UnfittedTransaction(t).log());
                    continue;
                }
                None => {
                    return Err(ReductionError::InvalidTopology(format!(
                        "no original TTC for representative transaction {}",
                        t
                    )))
                }
            };

            // Branches mapping to the same line share its flow.
            let mut per_line = vec![0.0; lines.len()];
            for (l, p) in reduced.transaction(&t)?.into_iter().enumerate() {
                per_line[branch_line[l]] += p;
            }
            let cand = per_line
                .into_iter()
                .enumerate()
                .filter(|(_, p)| p.abs() > eps)
                .map(|(line, p)| (line, p.abs()))
                .collect::<Vec<(usize, f64)>>();

            transactions.push(t);
            ttc_orig.push(value);
            candidates.push(cand);
        }

        log::debug!(
            "fit index: {} synthetic lines, {} transactions, {} candidate pairs",
            lines.len(),
            transactions.len(),
            candidates.iter().map(|c| c.len()).sum::<usize>()
        );

        Ok(Self {
            lines,
            branch_line,
            transactions,
            ttc_orig,
            candidates,
            warnings,
        })
    }

    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn num_transactions(&self) -> usize {
        self.transactions.len()
    }

    /// End-point ids of synthetic line `l`, smaller first.
    pub fn line(&self, l: usize) -> (usize, usize) {
        self.lines[l]
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// `(line, |PTDF|)` pairs of fitted transaction `t`.
    pub fn candidates(&self, t: usize) -> &[(usize, f64)] {
        &self.candidates[t]
    }

    /// Expands per-line capacities to the reduced flow branch ordering.
    pub fn branch_capacities(&self, line_capacity: &[f64]) -> Vec<f64> {
        self.branch_line.iter().map(|&l| line_capacity[l]).collect()
    }

    /// Big-M constant: max TTC_orig * max |PTDF| * `factor`.
    fn big_m(&self, factor: f64) -> f64 {
        let ttc = self.ttc_orig.iter().fold(0.0_f64, |m, v| m.max(*v));
        let ptdf = self
            .candidates
            .iter()
            .flatten()
            .fold(0.0_f64, |m, (_, p)| m.max(*p));
        let m = ttc * ptdf * factor;
        if m > 0.0 {
            m
        } else {
            1.0
        }
    }
}

/// Variable layout of a capacity program.
struct Vars {
    ttc: Vec<usize>,
    cap: Vec<usize>,
    /// MIQP only: (transaction, line, z, b) per candidate pair.
    pairs: Vec<(usize, usize, usize, usize)>,
}

/// `sum (TTC_eq - TTC_orig)^2` expanded into quadratic, linear and constant
/// parts.
fn add_ttc_match(program: &mut Program, index: &FitIndex, vars: &Vars) {
    for (t, &v) in vars.ttc.iter().enumerate() {
        let target = index.ttc_orig[t];
        program.quadratic[v] += 1.0;
        program.linear[v] -= 2.0 * target;
        program.constant += target * target;
    }
}

/// `TTC_eq[t] * |PTDF[t,l]| <= C_eq[l]` for every candidate pair.
fn add_ratio_constraints(program: &mut Program, index: &FitIndex, vars: &Vars) {
    for (t, cand) in index.candidates.iter().enumerate() {
        for &(l, p) in cand {
            program.add_constraint(vec![(vars.ttc[t], p), (vars.cap[l], -1.0)], Sense::Le, 0.0);
        }
    }
}

fn build_qp(index: &FitIndex, lambda: f64) -> (Program, Vars) {
    let mut program = Program::new();
    let ttc = (0..index.num_transactions())
        .map(|_| program.add_var(0.0, None))
        .collect();
    let cap = (0..index.num_lines())
        .map(|_| program.add_var(0.0, None))
        .collect::<Vec<usize>>();
    let vars = Vars {
        ttc,
        cap,
        pairs: Vec::new(),
    };

    add_ttc_match(&mut program, index, &vars);
    for &c in &vars.cap {
        program.quadratic[c] += lambda;
    }
    add_ratio_constraints(&mut program, index, &vars);
    (program, vars)
}

/// Capacities only appear in the ratio constraints, so they are boxed by
/// the big-M constant to keep the optimal face bounded.
fn build_lp(index: &FitIndex, cap_bound: f64) -> (Program, Vars) {
    let mut program = Program::new();
    let ttc = index
        .ttc_orig
        .iter()
        .map(|&target| program.add_var(0.0, Some(target)))
        .collect::<Vec<usize>>();
    let cap = (0..index.num_lines())
        .map(|_| program.add_var(0.0, Some(cap_bound)))
        .collect();
    let vars = Vars {
        ttc,
        cap,
        pairs: Vec::new(),
    };

    for &v in &vars.ttc {
        program.linear[v] = -1.0;
    }
    add_ratio_constraints(&mut program, index, &vars);
    (program, vars)
}

fn build_miqp(index: &FitIndex, lambda: f64, big_m: f64) -> (Program, Vars) {
    let mut program = Program::new();
    let ttc = (0..index.num_transactions())
        .map(|_| program.add_var(0.0, None))
        .collect::<Vec<usize>>();
    // C <= M keeps the big-M relaxation of Z >= C - M(1 - b) valid.
    let cap = (0..index.num_lines())
        .map(|_| program.add_var(0.0, Some(big_m)))
        .collect::<Vec<usize>>();

    let mut pairs = Vec::new();
    for (t, cand) in index.candidates.iter().enumerate() {
        let mut ttc_def = vec![(ttc[t], 1.0)];
        let mut choose = Vec::with_capacity(cand.len());
        for &(l, p) in cand {
            let z = program.add_var(0.0, None);
            let b = program.add_binary();
            ttc_def.push((z, -1.0 / p));
            choose.push((b, 1.0));

            program.add_constraint(vec![(z, 1.0), (cap[l], -1.0)], Sense::Le, 0.0);
            program.add_constraint(vec![(z, 1.0), (b, -big_m)], Sense::Le, 0.0);
            program.add_constraint(
                vec![(cap[l], 1.0), (z, -1.0), (b, big_m)],
                Sense::Le,
                big_m,
            );
            pairs.push((t, l, z, b));
        }
        program.add_constraint(ttc_def, Sense::Eq, 0.0);
        if !choose.is_empty() {
            program.add_constraint(choose, Sense::Le, 1.0);
        }
    }

    let vars = Vars { ttc, cap, pairs };
    add_ttc_match(&mut program, index, &vars);
    for &c in &vars.cap {
        program.quadratic[c] += lambda;
    }
    (program, vars)
}

/// Chooses synthetic line capacities so that reduced-network TTCs track the
/// original ones, using the formulation selected in `opt`.
///
/// A solve that ends without proving optimality still returns the values
/// the solver produced, with a [`Warning::SolverNonOptimal`] attached.
/// Programs with binary variables need a solver that honours them, such as
/// [`BranchAndBound`](crate::solver::BranchAndBound).
pub fn fit_capacities(
    index: &FitIndex,
    opt: &ReduceOpt,
    solver: &dyn ProgramSolver,
) -> Result<CapacityFit> {
    opt.validate()?;
    let big_m = index.big_m(opt.big_m_factor);
    let (program, vars) = match opt.formulation {
        Formulation::QP => build_qp(index, opt.lambda),
        Formulation::LP => build_lp(index, big_m),
        Formulation::MIQP => build_miqp(index, opt.lambda, big_m),
    };
    log::info!(
        "{} fit: {} variables, {} constraints",
        opt.formulation,
        program.num_vars(),
        program.constraints.len()
    );

    let sol = solver.solve(&program)?;
    if !sol.status.has_values() {
        return Err(ReductionError::Solver(format!(
            "{} fit terminated with status {:?} and no solution",
            opt.formulation, sol.status
        )));
    }

    let mut warnings = index.warnings.clone();
    if !sol.status.is_optimal() {
        warnings.push(
            Warning::SolverNonOptimal {
                formulation: opt.formulation,
                status: sol.status,
            }
            .log(),
        );
    }
    log::debug!(
        "{} fit: status {:?}, objective {}, {} iterations, max violation {:e}",
        opt.formulation,
        sol.status,
        sol.objective,
        sol.iterations,
        program.max_violation(&sol.x)
    );

    let lines = index
        .lines
        .iter()
        .zip(&vars.cap)
        .map(|(&(from, to), &c)| SyntheticLine {
            from,
            to,
            capacity: sol.x[c].max(0.0),
        })
        .collect::<Vec<SyntheticLine>>();
    for line in &lines {
        log::trace!("C_eq({},{}) = {}", line.from, line.to, format_f64(line.capacity));
    }

    let mut binding = vec![None; index.num_transactions()];
    for &(t, l, _, b) in &vars.pairs {
        if sol.x[b] > 0.5 {
            binding[t] = Some(l);
        }
    }

    let transactions = index
        .transactions
        .iter()
        .enumerate()
        .map(|(t, &transaction)| FittedTtc {
            transaction,
            original: index.ttc_orig[t],
            fitted: sol.x[vars.ttc[t]].max(0.0),
            binding: binding[t],
        })
        .collect();

    Ok(CapacityFit {
        formulation: opt.formulation,
        lines,
        transactions,
        status: sol.status,
        objective: sol.objective,
        warnings,
    })
}

impl CapacityFit {
    /// Fitted capacity of every synthetic line, in line order.
    pub fn capacities(&self) -> Vec<f64> {
        self.lines.iter().map(|l| l.capacity).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dc::{make_b_dc, matrix_flow_branches};
    use crate::network::{Branch, Bus};
    use crate::opt::SolverOpt;
    use crate::ptdf::make_ptdf;
    use crate::solver::{default_solver, ProgramSolution};
    use crate::ybus::make_ybus;

    fn triangle_ptdf() -> InjectionPtdf {
        let bus = (1..=3).map(|i| Bus::new(i, "A")).collect::<Vec<Bus>>();
        let branch = vec![
            Branch::new(1, 2, 0.0, 0.1, 1.0),
            Branch::new(2, 3, 0.0, 0.1, 1.0),
            Branch::new(1, 3, 0.0, 0.2, 1.0),
        ];
        let b_bus = make_b_dc(&make_ybus(&bus, &branch));
        let flow = matrix_flow_branches(&b_bus, 1e-9);
        let (ptdf, _) = make_ptdf(&b_bus, &[1, 2, 3], flow, 0, &ReduceOpt::default()).unwrap();
        ptdf
    }

    fn limited(a: usize, b: usize, value: f64) -> TtcRecord {
        TtcRecord {
            transaction: Transaction { a, b },
            outcome: TtcOutcome::Limited { value, branch: 0 },
        }
    }

    fn originals() -> Vec<TtcRecord> {
        vec![limited(1, 2, 2.0), limited(1, 3, 1.5), limited(2, 3, 2.5)]
    }

    fn opt(formulation: Formulation) -> ReduceOpt {
        ReduceOpt {
            formulation,
            ..ReduceOpt::default()
        }
    }

    fn assert_ratio_holds(index: &FitIndex, fit: &CapacityFit) {
        let cap = fit.capacities();
        for (t, f) in fit.transactions.iter().enumerate() {
            for &(l, p) in index.candidates(t) {
                assert!(
                    f.fitted * p <= cap[l] + 1e-5,
                    "{}: {} * {} > {}",
                    f.transaction,
                    f.fitted,
                    p,
                    cap[l]
                );
            }
        }
    }

    #[test]
    fn index_dedups_lines_and_skips_unbounded() {
        let ptdf = triangle_ptdf();
        let mut orig = originals();
        orig[1].outcome = TtcOutcome::Unbounded;
        let index = FitIndex::new(&ptdf, &orig, 1e-6).unwrap();

        assert_eq!(index.num_lines(), 3);
        assert_eq!(index.line(0), (1, 2));
        assert_eq!(index.transactions().len(), 2);
        assert_eq!(
            index.warnings,
            vec![Warning::UnfittedTransaction(Transaction { a: 1, b: 3 })]
        );
        assert!(index
            .candidates(0)
            .iter()
            .all(|&(_, p)| p > 1e-6 && p <= 1.0 + 1e-12));
    }

    #[test]
    fn missing_original_record_is_an_error() {
        let ptdf = triangle_ptdf();
        let orig = vec![limited(1, 2, 2.0)];
        assert!(matches!(
            FitIndex::new(&ptdf, &orig, 1e-6),
            Err(ReductionError::InvalidTopology(_))
        ));
    }

    #[test]
    fn qp_respects_ratio_constraints() {
        let index = FitIndex::new(&triangle_ptdf(), &originals(), 1e-6).unwrap();
        let solver = default_solver(&SolverOpt::default());
        let fit = fit_capacities(&index, &opt(Formulation::QP), &solver).unwrap();

        assert_eq!(fit.status, SolveStatus::Optimal);
        assert!(fit.warnings.is_empty());
        assert_eq!(fit.lines.len(), 3);
        assert!(fit.transactions.iter().all(|t| t.binding.is_none()));
        assert!(fit.transactions.iter().all(|t| t.fitted > 0.0));
        assert_ratio_holds(&index, &fit);
    }

    #[test]
    fn lp_never_exceeds_original() {
        let index = FitIndex::new(&triangle_ptdf(), &originals(), 1e-6).unwrap();
        let solver = default_solver(&SolverOpt::default());
        let fit = fit_capacities(&index, &opt(Formulation::LP), &solver).unwrap();

        assert!(fit.status.has_values());
        for t in &fit.transactions {
            assert!(t.fitted <= t.original + 1e-5);
            assert!(t.binding.is_none());
        }
        assert_ratio_holds(&index, &fit);
    }

    #[test]
    fn miqp_selects_one_binding_line() {
        let index = FitIndex::new(&triangle_ptdf(), &originals(), 1e-6).unwrap();
        let solver = default_solver(&SolverOpt::default());
        let fit = fit_capacities(&index, &opt(Formulation::MIQP), &solver).unwrap();

        assert!(fit.status.has_values());
        let cap = fit.capacities();
        for (t, f) in fit.transactions.iter().enumerate() {
            let l = f.binding.expect("binding line");
            let p = index
                .candidates(t)
                .iter()
                .find(|&&(line, _)| line == l)
                .map(|&(_, p)| p)
                .unwrap();
            assert!((f.fitted - cap[l] / p).abs() < 1e-4);
        }
    }

    struct Stalled(SolveStatus);

    impl ProgramSolver for Stalled {
        fn solve(&self, program: &Program) -> Result<ProgramSolution> {
            Ok(ProgramSolution {
                status: self.0,
                x: vec![0.0; program.num_vars()],
                objective: 0.0,
                iterations: 1,
            })
        }
    }

    #[test]
    fn non_optimal_solve_is_a_warning() {
        let index = FitIndex::new(&triangle_ptdf(), &originals(), 1e-6).unwrap();
        let fit = fit_capacities(
            &index,
            &opt(Formulation::QP),
            &Stalled(SolveStatus::IterationLimit),
        )
        .unwrap();
        assert_eq!(
            fit.warnings,
            vec![Warning::SolverNonOptimal {
                formulation: Formulation::QP,
                status: SolveStatus::IterationLimit
            }]
        );
        assert_eq!(fit.lines.len(), 3);
    }

    #[test]
    fn solve_without_values_is_an_error() {
        let index = FitIndex::new(&triangle_ptdf(), &originals(), 1e-6).unwrap();
        let res = fit_capacities(
            &index,
            &opt(Formulation::LP),
            &Stalled(SolveStatus::Infeasible),
        );
        assert!(matches!(res, Err(ReductionError::Solver(_))));
    }

    #[test]
    fn small_big_m_factor_is_rejected_before_solving() {
        let index = FitIndex::new(&triangle_ptdf(), &originals(), 1e-6).unwrap();
        let opt = ReduceOpt {
            big_m_factor: 0.5,
            ..opt(Formulation::LP)
        };
        // The solver would report a usable solution if it were reached.
        let res = fit_capacities(&index, &opt, &Stalled(SolveStatus::Optimal));
        assert!(matches!(res, Err(ReductionError::InvalidOption(_))));
    }
}
