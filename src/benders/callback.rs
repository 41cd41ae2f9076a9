//! The single-tree engine: one master branch-and-bound, with optimality and
//! feasibility cuts injected lazily at every integer-feasible candidate. A
//! candidate becomes the incumbent exactly when the pricing round adds no
//! cut.

use std::time::Instant;

use anyhow::bail;
use rand::Rng;
use tracing::*;

use crate::*;
use crate::data::ProblemData;
use crate::lp::{LpSolver, SolveStatus};
use crate::model::{build_master, build_subproblem, Master, Subproblem};
use crate::scenario::Scenario;
use super::*;

/// Runs the decomposition inside a single master search. The iteration and
/// time budgets of [`data.params`](crate::data::Params) do not apply here;
/// the search is bounded by the backend's own node budget.
#[instrument(level = "info", skip(data, rng), fields(instance = %data.name))]
pub fn solve<S: LpSolver + Default, R: Rng>(data: &ProblemData, rng: &mut R) -> Result<BendersOutcome> {
    let start = Instant::now();
    let scenarios = Scenario::build_all(data, rng)?;

    let mut subproblems: Vec<Subproblem<S>> = Vec::new();
    for row in &scenarios {
        for s in row {
            for cluster in &s.clusters {
                subproblems.push(build_subproblem(data, s.shift, s.index, cluster, true)?);
            }
        }
    }
    let mut master = build_master::<S>(data);
    let Master { model, index } = &mut master;
    info!(subproblems = subproblems.len(), "decomposition built");

    let s = data.params.scenarios_per_shift as f64;
    let cut_tol = cut_tolerance(data.params.eps, subproblems.len());
    let mut log = ConvergenceLog::default();
    let mut o_cuts = 0;
    let mut f_cuts = 0;
    let mut callbacks = 0;
    let mut best: Option<ProblemSolution> = None;

    let status = model.solve_with_lazy(|cand, cuts| {
        callbacks += 1;
        let trial = index.trial_from_values(data, cand.values);

        let mut all_feasible = true;
        let mut second_stage_total = 0.0;
        for sp in subproblems.iter_mut() {
            sp.apply_fleet(&trial.fleet);
            let active = &trial.active_digits[&sp.depot];
            match sp.model.solve()? {
                SolveStatus::Optimal | SolveStatus::Feasible => {
                    let obj = sp.model.obj_value();
                    second_stage_total += obj;
                    let alpha = index.alpha_col(sp.shift, sp.scenario, sp.depot);
                    if cand.values[alpha.0] < obj - cut_tol {
                        let c = optimality_cut(alpha, active, obj, o_cuts);
                        cuts.add(c.coeffs, c.sense, c.rhs, c.name);
                        o_cuts += 1;
                    }
                }
                SolveStatus::Infeasible => {
                    all_feasible = false;
                    let c = feasibility_cut(active, f_cuts);
                    cuts.add(c.coeffs, c.sense, c.rhs, c.name);
                    f_cuts += 1;
                }
                SolveStatus::Other => {
                    bail!("subproblem (shift {}, scenario {}, depot {}) solve failed \
                           inside callback {}", sp.shift, sp.scenario, sp.depot, callbacks);
                }
            }
        }

        if all_feasible && cuts.is_empty() {
            let objective = trial.fixed_cost + second_stage_total / s;
            debug!(callbacks, objective, "candidate accepted");
            best = Some(record_solution(data, &scenarios, &subproblems, &trial, objective));
        } else {
            trace!(callbacks, added = cuts.len(), "candidate rejected");
        }

        log.push(LogRow {
            iteration: callbacks,
            zinf: cand.objective,
            zsup: best.as_ref().map_or(f64::INFINITY, |b| b.objective),
            incumbent: cand.incumbent,
            o_cuts,
            f_cuts,
            elapsed: start.elapsed(),
        });
        Ok(())
    })?;

    let termination = match status {
        SolveStatus::Optimal => Termination::Converged,
        SolveStatus::Infeasible => {
            bail!("master search infeasible after {} feasibility cuts; \
                   no fleet within the bounds can serve every scenario", f_cuts);
        }
        SolveStatus::Feasible | SolveStatus::Other => {
            if best.is_none() {
                bail!("master search stopped without an incumbent");
            }
            Termination::IterationLimit
        }
    };

    let zinf = model.obj_value();
    let zsup = best.as_ref().map_or(f64::INFINITY, |b| b.objective);
    info!(%termination, zinf, zsup, callbacks, "run finished");
    return Ok(BendersOutcome {
        termination,
        zinf,
        zsup,
        iterations: callbacks,
        o_cuts,
        f_cuts,
        elapsed: start.elapsed(),
        solution: best,
        log,
    });
}
