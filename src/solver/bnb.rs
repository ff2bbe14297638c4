use super::{Program, ProgramSolution, SolveStatus};
use crate::error::{ReductionError, Result};
use crate::opt::SolverOpt;
use crate::traits::ProgramSolver;

/// Depth-first branch-and-bound over binary variables.
///
/// Every node is a continuous relaxation handed to the wrapped solver with
/// some binaries fixed to 0 or 1. Branching picks the most fractional
/// binary and explores the side it is closer to first. Programs without
/// binaries go straight to the relaxation solver.
pub struct BranchAndBound<S> {
    relaxation: S,
    opt: SolverOpt,
}

impl<S: ProgramSolver> BranchAndBound<S> {
    pub fn new(relaxation: S, opt: SolverOpt) -> Self {
        Self { relaxation, opt }
    }

    /// Most fractional free binary of `x`, if any exceeds the tolerance.
    fn branch_var(&self, program: &Program, fixed: &[(usize, f64)], x: &[f64]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, _) in program.binary.iter().enumerate().filter(|&(_, &b)| b) {
            if fixed.iter().any(|&(j, _)| j == i) {
                continue;
            }
            let frac = (x[i] - x[i].round()).abs();
            if frac <= self.opt.integrality_tolerance {
                continue;
            }
            if best.map_or(true, |(_, f)| frac > f) {
                best = Some((i, frac));
            }
        }
        best.map(|(i, _)| i)
    }
}

impl<S: ProgramSolver> ProgramSolver for BranchAndBound<S> {
    fn solve(&self, program: &Program) -> Result<ProgramSolution> {
        if !program.has_binaries() {
            return self.relaxation.solve(program);
        }

        let mut stack: Vec<Vec<(usize, f64)>> = vec![Vec::new()];
        let mut incumbent: Option<ProgramSolution> = None;
        let mut root: Option<ProgramSolution> = None;
        let mut nodes = 0;
        let mut exhausted = true;
        let mut degraded = false;

        while let Some(fixed) = stack.pop() {
            if nodes >= self.opt.node_limit {
                exhausted = false;
                break;
            }
            nodes += 1;

            let mut sub = program.clone();
            for &(i, v) in &fixed {
                sub.lower[i] = v;
                sub.upper[i] = Some(v);
            }
            let sol = self.relaxation.solve(&sub)?;
            if root.is_none() {
                root = Some(sol.clone());
            }

            match sol.status {
                SolveStatus::Optimal => {}
                SolveStatus::Suboptimal => degraded = true,
                SolveStatus::Infeasible => continue,
                status => {
                    log::debug!("branch-and-bound: node {} ended {:?}", nodes, status);
                    degraded = true;
                    continue;
                }
            }

            if let Some(inc) = &incumbent {
                let gap = self.opt.mip_gap * inc.objective.abs().max(1.0);
                if sol.objective >= inc.objective - gap {
                    continue;
                }
            }

            match self.branch_var(program, &fixed, &sol.x) {
                Some(i) => {
                    let near = sol.x[i].round().clamp(0.0, 1.0);
                    let far = 1.0 - near;
                    let mut far_node = fixed.clone();
                    far_node.push((i, far));
                    let mut near_node = fixed;
                    near_node.push((i, near));
                    stack.push(far_node);
                    stack.push(near_node);
                }
                None => {
                    let mut x = sol.x;
                    for (i, _) in program.binary.iter().enumerate().filter(|&(_, &b)| b) {
                        x[i] = x[i].round().clamp(0.0, 1.0);
                    }
                    let objective = program.objective_value(&x);
                    log::trace!("branch-and-bound: incumbent {} at node {}", objective, nodes);
                    incumbent = Some(ProgramSolution {
                        status: SolveStatus::Optimal,
                        x,
                        objective,
                        iterations: nodes,
                    });
                }
            }
        }

        log::debug!(
            "branch-and-bound: {} nodes, exhausted = {}, incumbent = {}",
            nodes,
            exhausted,
            incumbent.is_some()
        );

        match (incumbent, root) {
            (Some(mut inc), _) => {
                inc.iterations = nodes;
                inc.status = if !exhausted {
                    SolveStatus::NodeLimit
                } else if degraded {
                    SolveStatus::Suboptimal
                } else {
                    SolveStatus::Optimal
                };
                Ok(inc)
            }
            (None, Some(mut root)) => {
                root.iterations = nodes;
                root.status = if !exhausted {
                    SolveStatus::NodeLimit
                } else if root.status.has_values() {
                    // Relaxation was solvable but no integral point survived.
                    SolveStatus::Infeasible
                } else {
                    root.status
                };
                Ok(root)
            }
            (None, None) => Err(ReductionError::Solver(
                "branch-and-bound explored no nodes".to_string(),
            )),
        }
    }
}
