//! Depth-first branch-and-bound over the LP relaxation.
//!
//! Deterministic by construction: branching always picks the lowest-index
//! fractional integer column and explores the floor branch first. Lazy cuts
//! injected by a handler become ordinary rows of the model, so they bind at
//! every node explored afterwards.

use tracing::*;

use crate::Result;
use super::simplex::{self, LpOutcome, LpProblem};
use super::{Candidate, CutList, Milp, Sense, SolveStatus, VarKind};

const INT_TOL: f64 = 1e-6;
const OBJ_TOL: f64 = 1e-9;
const NODE_BUDGET: usize = 1_000_000;

type LazyHandler<'h> = &'h mut dyn FnMut(&Candidate, &mut CutList) -> Result<()>;

/// Extra variable bound introduced by branching: (column, sense, value).
type Bound = (usize, Sense, f64);

pub(crate) fn search(model: &mut Milp, mut handler: Option<LazyHandler>) -> Result<SolveStatus> {
    let n = model.objective.len();
    if n == 0 {
        model.solution.clear();
        model.obj = 0.0;
        return Ok(SolveStatus::Optimal);
    }

    let mut stack: Vec<Vec<Bound>> = vec![Vec::new()];
    let mut best: Option<(Vec<f64>, f64)> = None;
    let mut nodes = 0usize;

    while let Some(bounds) = stack.pop() {
        nodes += 1;
        if nodes > NODE_BUDGET {
            warn!(nodes, "node budget exhausted");
            return Ok(SolveStatus::Other);
        }

        let lp = relaxation(model, &bounds);
        let (x, obj) = match simplex::solve(&lp) {
            LpOutcome::Infeasible => continue,
            LpOutcome::Unbounded => {
                warn!("LP relaxation is unbounded");
                return Ok(SolveStatus::Other);
            }
            LpOutcome::IterLimit => {
                warn!("simplex pivot budget exhausted");
                return Ok(SolveStatus::Other);
            }
            LpOutcome::Optimal { x, obj } => (x, obj),
        };

        if let Some((_, bobj)) = &best {
            if obj >= *bobj - OBJ_TOL {
                continue;
            }
        }

        let frac = (0..n).find(|&j| {
            !matches!(model.kinds[j], VarKind::Continuous) && (x[j] - x[j].round()).abs() > INT_TOL
        });

        match frac {
            Some(j) => {
                let mut up = bounds.clone();
                up.push((j, Sense::Ge, x[j].ceil()));
                stack.push(up);
                let mut down = bounds.clone();
                down.push((j, Sense::Le, x[j].floor()));
                stack.push(down);
            }
            None => {
                // integer-feasible candidate
                if let Some(h) = handler.as_mut() {
                    let cand = Candidate {
                        values: &x,
                        objective: obj,
                        incumbent: best.as_ref().map(|(_, o)| *o),
                    };
                    let mut cuts = CutList::default();
                    h(&cand, &mut cuts)?;
                    if !cuts.is_empty() {
                        trace!(count = cuts.len(), "injecting lazy cuts");
                        for cut in cuts.drain() {
                            model.apply_cut(cut)?;
                        }
                        // candidate rejected; re-solve this node against the cuts
                        stack.push(bounds);
                        continue;
                    }
                }
                trace!(obj, "new incumbent");
                best = Some((x, obj));
            }
        }
    }

    match best {
        Some((x, obj)) => {
            model.solution = x;
            model.obj = obj;
            Ok(SolveStatus::Optimal)
        }
        None => Ok(SolveStatus::Infeasible),
    }
}

fn relaxation(model: &Milp, bounds: &[Bound]) -> LpProblem {
    let n = model.objective.len();
    let mut rows: Vec<(Vec<(usize, f64)>, Sense, f64)> = Vec::with_capacity(
        model.rows.len() + bounds.len() + n,
    );
    for r in &model.rows {
        let coeffs = r.coeffs.iter().map(|&(c, v)| (c.0, v)).collect();
        rows.push((coeffs, r.sense, r.rhs));
    }
    for (j, kind) in model.kinds.iter().enumerate() {
        if matches!(kind, VarKind::Binary) {
            rows.push((vec![(j, 1.0)], Sense::Le, 1.0));
        }
    }
    for &(j, sense, v) in bounds {
        rows.push((vec![(j, 1.0)], sense, v));
    }
    LpProblem { ncols: n, obj: model.objective.clone(), rows }
}
