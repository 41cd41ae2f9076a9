//! The alternating (cutting-plane) engine: solve the master to optimality,
//! price the trial fleet against every subproblem, add cuts, repeat until
//! the bounds close or a budget runs out.

use std::time::Instant;

use anyhow::bail;
use rand::Rng;
use tracing::*;

use crate::*;
use crate::data::ProblemData;
use crate::lp::{Cut, LpSolver, SolveStatus};
use crate::model::{build_master, build_subproblem, Subproblem};
use crate::scenario::Scenario;
use super::*;

/// Runs the full decomposition. `rng` drives the scenario sampling; the
/// solves themselves are deterministic.
#[instrument(level = "info", skip(data, rng), fields(instance = %data.name))]
pub fn solve<S: LpSolver + Default, R: Rng>(data: &ProblemData, rng: &mut R) -> Result<BendersOutcome> {
    let start = Instant::now();
    let scenarios = Scenario::build_all(data, rng)?;

    let mut subproblems: Vec<Subproblem<S>> = Vec::new();
    for row in &scenarios {
        for s in row {
            for cluster in &s.clusters {
                subproblems.push(build_subproblem(data, s.shift, s.index, cluster, false)?);
            }
        }
    }
    let mut master = build_master::<S>(data);
    info!(subproblems = subproblems.len(), "decomposition built");

    let s = data.params.scenarios_per_shift as f64;
    let eps = data.params.eps;
    let cut_tol = cut_tolerance(eps, subproblems.len());
    let mut log = ConvergenceLog::default();
    let mut o_cuts = 0;
    let mut f_cuts = 0;
    let mut iterations = 0;
    let mut zinf = f64::NEG_INFINITY;
    let mut best: Option<ProblemSolution> = None;

    let termination = loop {
        iterations += 1;

        match master.model.solve()? {
            SolveStatus::Optimal | SolveStatus::Feasible => {}
            SolveStatus::Infeasible => {
                bail!("master became infeasible after {} feasibility cuts; \
                       no fleet within the bounds can serve every scenario", f_cuts);
            }
            SolveStatus::Other => bail!("master solve failed at iteration {}", iterations),
        }
        zinf = master.model.obj_value();
        let trial = master.trial(data);
        let master_values = master.model.var_values().to_vec();

        let mut all_feasible = true;
        let mut second_stage_total = 0.0;
        let mut cuts: Vec<Cut> = Vec::new();

        for sp in &mut subproblems {
            sp.apply_fleet(&trial.fleet);
            let active = &trial.active_digits[&sp.depot];
            match sp.model.solve()? {
                SolveStatus::Optimal | SolveStatus::Feasible => {
                    let obj = sp.model.obj_value();
                    second_stage_total += obj;
                    let alpha = master.alpha_col(sp.shift, sp.scenario, sp.depot);
                    if master_values[alpha.0] < obj - cut_tol {
                        cuts.push(optimality_cut(alpha, active, obj, o_cuts));
                        o_cuts += 1;
                    }
                }
                SolveStatus::Infeasible => {
                    all_feasible = false;
                    cuts.push(feasibility_cut(active, f_cuts));
                    f_cuts += 1;
                }
                SolveStatus::Other => {
                    bail!("subproblem (shift {}, scenario {}, depot {}) solve failed",
                          sp.shift, sp.scenario, sp.depot);
                }
            }
        }

        if all_feasible {
            let candidate = trial.fixed_cost + second_stage_total / s;
            if best.as_ref().map_or(true, |b| candidate < b.objective) {
                debug!(candidate, "new incumbent");
                best = Some(record_solution(data, &scenarios, &subproblems, &trial, candidate));
            }
        }

        let zsup = best.as_ref().map_or(f64::INFINITY, |b| b.objective);
        log.push(LogRow {
            iteration: iterations,
            zinf,
            zsup,
            incumbent: best.as_ref().map(|b| b.objective),
            o_cuts,
            f_cuts,
            elapsed: start.elapsed(),
        });
        info!(iteration = iterations, zinf, zsup, o_cuts, f_cuts, "iteration done");

        if all_feasible && zsup - zinf <= eps {
            break Termination::Converged;
        }
        if iterations >= data.params.max_iterations {
            warn!(iterations, "stopping on iteration budget");
            break Termination::IterationLimit;
        }
        if data.params.time_limit.map_or(false, |tl| start.elapsed() >= tl) {
            warn!(elapsed = ?start.elapsed(), "stopping on time budget");
            break Termination::TimeLimit;
        }

        for cut in cuts {
            master.model.add_constr(cut.coeffs, cut.sense, cut.rhs, cut.name);
        }
    };

    let zsup = best.as_ref().map_or(f64::INFINITY, |b| b.objective);
    info!(%termination, zinf, zsup, iterations, "run finished");
    return Ok(BendersOutcome {
        termination,
        zinf,
        zsup,
        iterations,
        o_cuts,
        f_cuts,
        elapsed: start.elapsed(),
        solution: best,
        log,
    });
}
