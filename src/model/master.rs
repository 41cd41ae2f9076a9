//! First-stage (fleet sizing) model.

use tracing::*;

use crate::*;
use crate::data::ProblemData;
use crate::lp::{Col, LpSolver, Row, Sense, VarKind};
use super::{Fleet, MasterConstr, MasterVar};

/// Column/row lookup for a built master, kept apart from the model so a
/// lazy-constraint handler can read it while the model is mutably borrowed
/// by the solve.
pub struct MasterIndex {
    vars: Map<MasterVar, Col>,
    #[allow(dead_code)]
    rows: Map<MasterConstr, Row>,
}

pub struct Master<S> {
    pub model: S,
    pub index: MasterIndex,
}

/// One trial first-stage solution read off the master.
#[derive(Debug, Clone)]
pub struct Trial {
    pub fleet: Fleet,
    /// Fixed fleet cost of the trial, the first-stage share of `zsup`.
    pub fixed_cost: f64,
    /// Per depot, the digit columns sitting at one, across all vehicle
    /// types. This is what the no-good and optimality cuts are built from.
    pub active_digits: Map<CustomerId, Vec<Col>>,
}

/// Builds fleet-digit variables, alpha/alphaH variables and the structural
/// constraints of the master.
#[instrument(level = "debug", skip(data))]
pub fn build_master<S: LpSolver + Default>(data: &ProblemData) -> Master<S> {
    let mut model = S::default();
    let mut vars = Map::default();
    let mut rows = Map::default();

    // fleet-size digits: binary, one per candidate fleet size
    for vt in &data.vehicle_types {
        for &d in &data.depots {
            for digit in 0..=vt.max_fleet {
                let obj = digit as f64 * data.depot_costs[&(d, vt.id)];
                let col = model.add_var(obj, VarKind::Binary, format!("n_{}_{}_{}", d, digit, vt.id));
                vars.insert(MasterVar::FleetDigit { depot: d, vt: vt.id, digit }, col);
            }
        }
    }

    // per-scenario second-stage proxies (no objective weight)
    for t in 0..data.shifts {
        for i in 0..data.params.scenarios_per_shift {
            for &d in &data.depots {
                let col = model.add_var(0.0, VarKind::Continuous, format!("alpha_{}_{}_{}", t, i, d));
                vars.insert(MasterVar::Alpha { shift: t, scenario: i, depot: d }, col);
            }
        }
    }

    // expected second-stage cost per (shift, depot)
    for t in 0..data.shifts {
        for &d in &data.depots {
            let col = model.add_var(1.0, VarKind::Continuous, format!("alphaH_{}_{}", t, d));
            vars.insert(MasterVar::AlphaH { shift: t, depot: d }, col);
        }
    }

    // exactly one digit per (depot, vehicle type)
    for vt in &data.vehicle_types {
        for &d in &data.depots {
            let coeffs = (0..=vt.max_fleet)
                .map(|digit| (vars[&MasterVar::FleetDigit { depot: d, vt: vt.id, digit }], 1.0))
                .collect();
            let row = model.add_constr(coeffs, Sense::Eq, 1.0, format!("singleVar_{}_{}", d, vt.id));
            rows.insert(MasterConstr::OneHot { depot: d, vt: vt.id }, row);
        }
    }

    // fleet bounds per vehicle type, summed over depots
    for vt in &data.vehicle_types {
        let coeffs: Vec<(Col, f64)> = data.depots.iter()
            .flat_map(|&d| (0..=vt.max_fleet).map(move |digit| (d, digit)))
            .map(|(d, digit)| (vars[&MasterVar::FleetDigit { depot: d, vt: vt.id, digit }], digit as f64))
            .collect();

        if vt.min_fleet > 0 {
            let row = model.add_constr(coeffs.clone(), Sense::Ge, vt.min_fleet as f64, format!("minFleet_{}", vt.id));
            rows.insert(MasterConstr::MinFleet { vt: vt.id }, row);
        }
        let row = model.add_constr(coeffs, Sense::Le, vt.max_fleet as f64, format!("maxFleet_{}", vt.id));
        rows.insert(MasterConstr::MaxFleet { vt: vt.id }, row);
    }

    // alphaH - (1/S) sum_i alpha_i = 0
    let s = data.params.scenarios_per_shift as f64;
    for t in 0..data.shifts {
        for &d in &data.depots {
            let mut coeffs = vec![(vars[&MasterVar::AlphaH { shift: t, depot: d }], 1.0)];
            for i in 0..data.params.scenarios_per_shift {
                coeffs.push((vars[&MasterVar::Alpha { shift: t, scenario: i, depot: d }], -1.0 / s));
            }
            let row = model.add_constr(coeffs, Sense::Eq, 0.0, format!("c_alpha_{}_{}", t, d));
            rows.insert(MasterConstr::AlphaLink { shift: t, depot: d }, row);
        }
    }

    debug!(vars = model.num_vars(), constrs = model.num_constrs(), "master built");
    return Master { model, index: MasterIndex { vars, rows } };
}

impl<S: LpSolver> Master<S> {
    #[inline]
    pub fn alpha_col(&self, shift: usize, scenario: usize, depot: CustomerId) -> Col {
        self.index.alpha_col(shift, scenario, depot)
    }

    /// Reads the trial fleet decision out of the last master solve.
    pub fn trial(&self, data: &ProblemData) -> Trial {
        self.index.trial_from_values(data, self.model.var_values())
    }
}

impl MasterIndex {
    #[inline]
    pub fn alpha_col(&self, shift: usize, scenario: usize, depot: CustomerId) -> Col {
        self.vars[&MasterVar::Alpha { shift, scenario, depot }]
    }

    /// Extraction against an arbitrary value vector (a candidate from inside
    /// the branch-and-bound rather than a finished solve).
    pub fn trial_from_values(&self, data: &ProblemData, values: &[f64]) -> Trial {
        let mut fleet = Fleet::default();
        let mut fixed_cost = 0.0;
        let mut active_digits: Map<CustomerId, Vec<Col>> = Map::default();

        for &d in &data.depots {
            let active = active_digits.entry(d).or_default();
            for vt in &data.vehicle_types {
                let mut size = 0u32;
                for digit in 0..=vt.max_fleet {
                    let col = self.vars[&MasterVar::FleetDigit { depot: d, vt: vt.id, digit }];
                    if values[col.0] > 0.5 {
                        size += digit;
                        fixed_cost += digit as f64 * data.depot_costs[&(d, vt.id)];
                        active.push(col);
                    }
                }
                fleet.insert((d, vt.id), size);
            }
        }
        return Trial { fleet, fixed_cost, active_digits };
    }
}
