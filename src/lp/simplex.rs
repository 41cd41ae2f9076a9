//! Dense two-phase primal simplex over non-negative variables.
//!
//! Bland's rule on both the entering and leaving choice keeps the pivot
//! sequence finite and deterministic. Model sizes here are tiny (the
//! branch-and-bound re-solves from scratch at every node), so a dense
//! tableau is the simplest thing that works.

use super::Sense;

const EPS: f64 = 1e-9;
const FEAS_TOL: f64 = 1e-7;

pub(crate) struct LpProblem {
    pub ncols: usize,
    pub obj: Vec<f64>,
    pub rows: Vec<(Vec<(usize, f64)>, Sense, f64)>,
}

#[derive(Debug)]
pub(crate) enum LpOutcome {
    Optimal { x: Vec<f64>, obj: f64 },
    Infeasible,
    Unbounded,
    /// Pivot budget exhausted; numerically stuck.
    IterLimit,
}

struct Tableau {
    /// m rows of length ncols_total + 1; last entry is the rhs.
    rows: Vec<Vec<f64>>,
    basis: Vec<usize>,
    width: usize,
}

enum PhaseOutcome {
    Optimal,
    Unbounded,
    IterLimit,
}

impl Tableau {
    fn pivot(&mut self, r: usize, j: usize) {
        let piv = self.rows[r][j];
        debug_assert!(piv.abs() > EPS);
        for v in self.rows[r].iter_mut() {
            *v /= piv;
        }
        let pivot_row = self.rows[r].clone();
        for (i, row) in self.rows.iter_mut().enumerate() {
            if i == r {
                continue;
            }
            let f = row[j];
            if f.abs() > EPS {
                for (v, p) in row.iter_mut().zip(&pivot_row) {
                    *v -= f * p;
                }
            }
            row[j] = 0.0; // kill roundoff in the pivot column
        }
        self.basis[r] = j;
    }

    /// Runs simplex iterations for the cost vector `c`, only letting
    /// columns `< allowed_end` enter the basis.
    fn run_phase(&mut self, c: &[f64], allowed_end: usize, max_pivots: usize) -> PhaseOutcome {
        let m = self.rows.len();
        let n = self.width;

        // reduced-cost row, priced out against the current basis
        let mut obj_row = vec![0.0; n + 1];
        obj_row[..n].copy_from_slice(c);
        for i in 0..m {
            let cb = c[self.basis[i]];
            if cb.abs() > EPS {
                for j in 0..=n {
                    obj_row[j] -= cb * self.rows[i][j];
                }
            }
        }

        for _ in 0..max_pivots {
            // Bland: lowest-index improving column
            let entering = (0..allowed_end).find(|&j| obj_row[j] < -EPS);
            let j = match entering {
                Some(j) => j,
                None => return PhaseOutcome::Optimal,
            };

            // ratio test, ties to the lowest basis index
            let mut leave: Option<(usize, f64)> = None;
            for i in 0..m {
                let a = self.rows[i][j];
                if a > EPS {
                    let ratio = self.rows[i][n] / a;
                    let better = match leave {
                        None => true,
                        Some((li, lr)) => {
                            ratio < lr - EPS || (ratio < lr + EPS && self.basis[i] < self.basis[li])
                        }
                    };
                    if better {
                        leave = Some((i, ratio));
                    }
                }
            }
            let r = match leave {
                Some((r, _)) => r,
                None => return PhaseOutcome::Unbounded,
            };

            self.pivot(r, j);
            let f = obj_row[j];
            if f.abs() > EPS {
                for (v, p) in obj_row.iter_mut().zip(&self.rows[r]) {
                    *v -= f * p;
                }
            }
            obj_row[j] = 0.0;
        }
        return PhaseOutcome::IterLimit;
    }
}

pub(crate) fn solve(lp: &LpProblem) -> LpOutcome {
    let n = lp.ncols;
    let m = lp.rows.len();
    if m == 0 {
        // every variable is free to sit at its lower bound of zero
        return LpOutcome::Optimal { x: vec![0.0; n], obj: 0.0 };
    }

    // densify, flip rows so every rhs is non-negative
    let mut a = vec![vec![0.0; n]; m];
    let mut senses = Vec::with_capacity(m);
    let mut rhs = Vec::with_capacity(m);
    for (i, (coeffs, sense, b)) in lp.rows.iter().enumerate() {
        for &(j, v) in coeffs {
            a[i][j] += v;
        }
        if *b < 0.0 {
            for v in a[i].iter_mut() {
                *v = -*v;
            }
            rhs.push(-*b);
            senses.push(match sense {
                Sense::Le => Sense::Ge,
                Sense::Ge => Sense::Le,
                Sense::Eq => Sense::Eq,
            });
        } else {
            rhs.push(*b);
            senses.push(*sense);
        }
    }

    let n_slack = senses.iter().filter(|s| !matches!(s, Sense::Eq)).count();
    let n_art = senses.iter().filter(|s| !matches!(s, Sense::Le)).count();
    let slack_start = n;
    let art_start = n + n_slack;
    let width = n + n_slack + n_art;

    let mut tab = Tableau {
        rows: Vec::with_capacity(m),
        basis: Vec::with_capacity(m),
        width,
    };
    let mut next_slack = slack_start;
    let mut next_art = art_start;
    for i in 0..m {
        let mut row = vec![0.0; width + 1];
        row[..n].copy_from_slice(&a[i]);
        row[width] = rhs[i];
        match senses[i] {
            Sense::Le => {
                row[next_slack] = 1.0;
                tab.basis.push(next_slack);
                next_slack += 1;
            }
            Sense::Ge => {
                row[next_slack] = -1.0;
                next_slack += 1;
                row[next_art] = 1.0;
                tab.basis.push(next_art);
                next_art += 1;
            }
            Sense::Eq => {
                row[next_art] = 1.0;
                tab.basis.push(next_art);
                next_art += 1;
            }
        }
        tab.rows.push(row);
    }

    let max_pivots = 200 * (m + width) + 2000;

    // Phase 1: drive the artificials to zero.
    if n_art > 0 {
        let mut c1 = vec![0.0; width];
        for j in art_start..width {
            c1[j] = 1.0;
        }
        match tab.run_phase(&c1, width, max_pivots) {
            PhaseOutcome::Optimal => {}
            PhaseOutcome::Unbounded => unreachable!("phase 1 objective is bounded below by zero"),
            PhaseOutcome::IterLimit => return LpOutcome::IterLimit,
        }
        let art_sum: f64 = tab.rows.iter()
            .zip(&tab.basis)
            .filter(|(_, &b)| b >= art_start)
            .map(|(row, _)| row[width])
            .sum();
        if art_sum > FEAS_TOL {
            return LpOutcome::Infeasible;
        }

        // Pivot leftover (degenerate) artificials out of the basis; a row
        // with no structural coefficient left is redundant and gets dropped.
        let mut keep = vec![true; tab.rows.len()];
        for i in 0..tab.rows.len() {
            if tab.basis[i] < art_start {
                continue;
            }
            let piv = (0..art_start).find(|&j| tab.rows[i][j].abs() > EPS);
            match piv {
                Some(j) => tab.pivot(i, j),
                None => keep[i] = false,
            }
        }
        if keep.iter().any(|k| !k) {
            let mut rows = Vec::new();
            let mut basis = Vec::new();
            for (i, k) in keep.iter().enumerate() {
                if *k {
                    rows.push(std::mem::take(&mut tab.rows[i]));
                    basis.push(tab.basis[i]);
                }
            }
            tab.rows = rows;
            tab.basis = basis;
        }
    }

    // Phase 2: original objective, artificials barred from re-entering.
    let mut c2 = vec![0.0; width];
    c2[..n].copy_from_slice(&lp.obj);
    match tab.run_phase(&c2, art_start, max_pivots) {
        PhaseOutcome::Optimal => {}
        PhaseOutcome::Unbounded => return LpOutcome::Unbounded,
        PhaseOutcome::IterLimit => return LpOutcome::IterLimit,
    }

    let width_col = tab.width;
    let mut x = vec![0.0; n];
    for (row, &b) in tab.rows.iter().zip(&tab.basis) {
        if b < n {
            x[b] = row[width_col];
        }
    }
    let obj = lp.obj.iter().zip(&x).map(|(c, v)| c * v).sum();
    return LpOutcome::Optimal { x, obj };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lp(ncols: usize, obj: &[f64], rows: &[(&[(usize, f64)], Sense, f64)]) -> LpProblem {
        LpProblem {
            ncols,
            obj: obj.to_vec(),
            rows: rows.iter().map(|(c, s, r)| (c.to_vec(), *s, *r)).collect(),
        }
    }

    fn expect_optimal(out: LpOutcome) -> (Vec<f64>, f64) {
        match out {
            LpOutcome::Optimal { x, obj } => (x, obj),
            other => panic!("expected optimal, got {:?}", other),
        }
    }

    #[test]
    fn textbook_maximization() {
        // max 3x + 5y st x <= 4, 2y <= 12, 3x + 2y <= 18  => (2, 6), 36
        let p = lp(2, &[-3.0, -5.0], &[
            (&[(0, 1.0)], Sense::Le, 4.0),
            (&[(1, 2.0)], Sense::Le, 12.0),
            (&[(0, 3.0), (1, 2.0)], Sense::Le, 18.0),
        ]);
        let (x, obj) = expect_optimal(solve(&p));
        assert!((obj + 36.0).abs() < 1e-6);
        assert!((x[0] - 2.0).abs() < 1e-6 && (x[1] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn equality_and_ge_rows() {
        // min 2x + 3y st x + y = 4, x >= 1  => x=4, y=0, obj 8
        let p = lp(2, &[2.0, 3.0], &[
            (&[(0, 1.0), (1, 1.0)], Sense::Eq, 4.0),
            (&[(0, 1.0)], Sense::Ge, 1.0),
        ]);
        let (x, obj) = expect_optimal(solve(&p));
        assert!((obj - 8.0).abs() < 1e-6);
        assert!((x[0] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn infeasible_system() {
        let p = lp(1, &[1.0], &[
            (&[(0, 1.0)], Sense::Le, 1.0),
            (&[(0, 1.0)], Sense::Ge, 2.0),
        ]);
        assert!(matches!(solve(&p), LpOutcome::Infeasible));
    }

    #[test]
    fn unbounded_objective() {
        // min -x with x only bounded below
        let p = lp(1, &[-1.0], &[
            (&[(0, 1.0)], Sense::Ge, 0.0),
        ]);
        assert!(matches!(solve(&p), LpOutcome::Unbounded));
    }

    #[test]
    fn negative_rhs_is_normalized() {
        // min x st -x <= -3  (i.e. x >= 3)
        let p = lp(1, &[1.0], &[
            (&[(0, -1.0)], Sense::Le, -3.0),
        ]);
        let (x, obj) = expect_optimal(solve(&p));
        assert!((x[0] - 3.0).abs() < 1e-6);
        assert!((obj - 3.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_redundant_equalities() {
        // x + y = 2 stated twice; min x + y
        let p = lp(2, &[1.0, 1.0], &[
            (&[(0, 1.0), (1, 1.0)], Sense::Eq, 2.0),
            (&[(0, 1.0), (1, 1.0)], Sense::Eq, 2.0),
        ]);
        let (x, obj) = expect_optimal(solve(&p));
        assert!((obj - 2.0).abs() < 1e-6);
        assert!((x[0] + x[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn no_rows_means_origin() {
        let p = lp(3, &[1.0, 2.0, 3.0], &[]);
        let (x, obj) = expect_optimal(solve(&p));
        assert_eq!(x, vec![0.0; 3]);
        assert_eq!(obj, 0.0);
    }
}
