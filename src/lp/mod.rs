//! The linear/integer-programming boundary.
//!
//! The decomposition engines only ever talk to [`LpSolver`]; anything that
//! can build columns and rows, mutate a right-hand side and report one of
//! four statuses can drive them. [`Milp`] is the bundled backend: a dense
//! two-phase simplex under a depth-first branch-and-bound with lazy-cut
//! support. It is deliberately small and deterministic, not a
//! general-purpose solver.

use anyhow::bail;

use crate::Result;

mod simplex;
mod bnb;

/// Column index returned by [`LpSolver::add_var`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Col(pub usize);

/// Row index returned by [`LpSolver::add_constr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Row(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Binary,
    Integer,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

/// Solver verdicts. `Infeasible` is an expected, recoverable outcome for
/// the engines; `Other` (numerical trouble, unboundedness, exhausted node
/// budget) must be treated as fatal by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Other,
}

/// Read-only view of an integer-feasible candidate handed to a lazy
/// constraint handler.
#[derive(Debug)]
pub struct Candidate<'a> {
    /// Values indexed by column.
    pub values: &'a [f64],
    /// Objective value of this candidate.
    pub objective: f64,
    /// Best accepted objective so far, if any.
    pub incumbent: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Cut {
    pub coeffs: Vec<(Col, f64)>,
    pub sense: Sense,
    pub rhs: f64,
    pub name: String,
}

/// Append-only list of lazy constraints produced by a handler invocation.
/// Leaving it empty accepts the candidate.
#[derive(Debug, Default)]
pub struct CutList {
    cuts: Vec<Cut>,
}

impl CutList {
    pub fn add(&mut self, coeffs: Vec<(Col, f64)>, sense: Sense, rhs: f64, name: String) {
        self.cuts.push(Cut { coeffs, sense, rhs, name });
    }

    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    fn drain(&mut self) -> impl Iterator<Item = Cut> + '_ {
        self.cuts.drain(..)
    }
}

/// The solver interface consumed by the Benders engines.
pub trait LpSolver {
    fn add_var(&mut self, obj: f64, kind: VarKind, name: String) -> Col;
    fn add_constr(&mut self, coeffs: Vec<(Col, f64)>, sense: Sense, rhs: f64, name: String) -> Row;
    /// Mutates an existing constraint's bound without rebuilding the model.
    fn set_rhs(&mut self, row: Row, rhs: f64);
    fn solve(&mut self) -> Result<SolveStatus>;
    /// Runs a single branch-and-bound search, invoking `handler` at every
    /// integer-feasible candidate. Cuts appended by the handler are injected
    /// into the active search and reject the candidate; an empty cut list
    /// accepts it.
    fn solve_with_lazy<F>(&mut self, handler: F) -> Result<SolveStatus>
    where
        F: FnMut(&Candidate, &mut CutList) -> Result<()>;
    /// Objective value of the last solve. Only meaningful after a
    /// non-`Infeasible` status.
    fn obj_value(&self) -> f64;
    /// Variable values of the last solve, indexed by column.
    fn var_values(&self) -> &[f64];
    fn num_vars(&self) -> usize;
    fn num_constrs(&self) -> usize;
}

#[derive(Debug, Clone)]
struct RowData {
    coeffs: Vec<(Col, f64)>,
    sense: Sense,
    rhs: f64,
    #[allow(dead_code)]
    name: String,
}

/// Bundled exact MILP backend. All variables are implicitly non-negative;
/// binaries additionally get an upper bound of one at solve time.
#[derive(Debug, Default)]
pub struct Milp {
    objective: Vec<f64>,
    kinds: Vec<VarKind>,
    names: Vec<String>,
    rows: Vec<RowData>,
    solution: Vec<f64>,
    obj: f64,
}

impl Milp {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LpSolver for Milp {
    fn add_var(&mut self, obj: f64, kind: VarKind, name: String) -> Col {
        let col = Col(self.objective.len());
        self.objective.push(obj);
        self.kinds.push(kind);
        self.names.push(name);
        return col;
    }

    fn add_constr(&mut self, coeffs: Vec<(Col, f64)>, sense: Sense, rhs: f64, name: String) -> Row {
        debug_assert!(coeffs.iter().all(|&(c, _)| c.0 < self.objective.len()));
        let row = Row(self.rows.len());
        self.rows.push(RowData { coeffs, sense, rhs, name });
        return row;
    }

    fn set_rhs(&mut self, row: Row, rhs: f64) {
        self.rows[row.0].rhs = rhs;
    }

    fn solve(&mut self) -> Result<SolveStatus> {
        bnb::search(self, None)
    }

    fn solve_with_lazy<F>(&mut self, mut handler: F) -> Result<SolveStatus>
    where
        F: FnMut(&Candidate, &mut CutList) -> Result<()>,
    {
        bnb::search(self, Some(&mut handler))
    }

    fn obj_value(&self) -> f64 {
        self.obj
    }

    fn var_values(&self) -> &[f64] {
        &self.solution
    }

    fn num_vars(&self) -> usize {
        self.objective.len()
    }

    fn num_constrs(&self) -> usize {
        self.rows.len()
    }
}

impl Milp {
    fn apply_cut(&mut self, cut: Cut) -> Result<()> {
        for &(c, _) in &cut.coeffs {
            if c.0 >= self.objective.len() {
                bail!("lazy cut {} references unknown column {}", cut.name, c.0);
            }
        }
        self.rows.push(RowData { coeffs: cut.coeffs, sense: cut.sense, rhs: cut.rhs, name: cut.name });
        Ok(())
    }
}
