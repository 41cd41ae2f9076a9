//! Second-stage (route selection) model for one (shift, scenario, depot).

use anyhow::bail;
use tracing::*;

use crate::*;
use crate::data::ProblemData;
use crate::lp::{Col, LpSolver, Row, Sense, VarKind};
use crate::scenario::Cluster;
use super::{Fleet, SubConstr, SubVar};

pub struct Subproblem<S> {
    pub shift: usize,
    pub scenario: usize,
    pub depot: CustomerId,
    pub model: S,
    vars: Map<SubVar, Col>,
    /// The `FleetCap` right-hand sides are the only state mutated between
    /// Benders iterations.
    rows: Map<SubConstr, Row>,
    /// (vt, route, leased col, hired col) in construction order.
    route_cols: Vec<(VehicleTypeId, RouteId, Col, Col)>,
}

/// One route chosen by a solved subproblem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedRoute {
    pub vt: VehicleTypeId,
    pub route: RouteId,
    pub hired: bool,
}

/// Builds route-selection variables and coverage/capacity constraints for
/// one cluster. `with_hired_fleet` additionally creates the integer
/// hired-fleet-size variable per vehicle type (callback variant).
#[instrument(level = "debug", skip(data, cluster), fields(shift = shift, scenario = scenario, depot = %cluster.depot))]
pub fn build_subproblem<S: LpSolver + Default>(
    data: &ProblemData,
    shift: usize,
    scenario: usize,
    cluster: &Cluster,
    with_hired_fleet: bool,
) -> Result<Subproblem<S>> {
    let mut model = S::default();
    let mut vars = Map::default();
    let mut rows = Map::default();
    let mut route_cols = Vec::new();
    let d = cluster.depot;

    for vt in &data.vehicle_types {
        let routes = match cluster.routes.get(&vt.id) {
            Some(rs) => rs,
            None => continue,
        };

        for route in routes {
            let leased = model.add_var(
                vt.lease_cost * route.distance,
                VarKind::Binary,
                format!("x_{}_{}_{}_{}_{}", shift, scenario, d, route.id, vt.id),
            );
            vars.insert(SubVar::Leased { vt: vt.id, route: route.id }, leased);

            let hired = model.add_var(
                vt.hire_cost * route.distance,
                VarKind::Binary,
                format!("y_{}_{}_{}_{}_{}", shift, scenario, d, route.id, vt.id),
            );
            vars.insert(SubVar::Hired { vt: vt.id, route: route.id }, hired);
            route_cols.push((vt.id, route.id, leased, hired));
        }

        if with_hired_fleet {
            let yd = model.add_var(0.0, VarKind::Integer,
                                   format!("yd_{}_{}_{}_{}", shift, scenario, d, vt.id));
            vars.insert(SubVar::HiredFleet { vt: vt.id }, yd);
        }

        // leased routes limited by the fleet the master stations here; the
        // rhs starts at zero and is overwritten with each trial solution
        let coeffs = routes.iter()
            .map(|r| (vars[&SubVar::Leased { vt: vt.id, route: r.id }], 1.0))
            .collect();
        let row = model.add_constr(coeffs, Sense::Le, 0.0,
                                   format!("fleetSize_{}_{}_{}_{}", shift, scenario, d, vt.id));
        rows.insert(SubConstr::FleetCap { vt: vt.id }, row);

        if with_hired_fleet {
            let mut coeffs = vec![(vars[&SubVar::HiredFleet { vt: vt.id }], -1.0)];
            for r in routes {
                coeffs.push((vars[&SubVar::Hired { vt: vt.id, route: r.id }], 1.0));
            }
            let row = model.add_constr(coeffs, Sense::Eq, 0.0,
                                       format!("HVfleetSize_{}_{}_{}_{}", shift, scenario, d, vt.id));
            rows.insert(SubConstr::HiredLink { vt: vt.id }, row);
        }
    }

    // every cluster customer is served by exactly one selected route
    for &c in &cluster.customers {
        let mut coeffs: Vec<(Col, f64)> = Vec::new();
        for vt in &data.vehicle_types {
            let routes = match cluster.routes.get(&vt.id) {
                Some(rs) => rs,
                None => continue,
            };
            for route in routes.iter().filter(|r| r.visits(c)) {
                coeffs.push((vars[&SubVar::Leased { vt: vt.id, route: route.id }], 1.0));
                coeffs.push((vars[&SubVar::Hired { vt: vt.id, route: route.id }], 1.0));
            }
        }
        if coeffs.is_empty() {
            // would silently build an unsatisfiable empty equality
            bail!(
                "customer {} in cluster of depot {} (shift {}, scenario {}) appears on no route",
                c, d, shift, scenario
            );
        }
        let row = model.add_constr(coeffs, Sense::Eq, 1.0,
                                   format!("demand_{}_{}_{}_{}", shift, scenario, d, c));
        rows.insert(SubConstr::Cover { customer: c }, row);
    }

    debug!(vars = model.num_vars(), constrs = model.num_constrs(), "subproblem built");
    return Ok(Subproblem { shift, scenario, depot: d, model, vars, rows, route_cols });
}

impl<S: LpSolver> Subproblem<S> {
    /// Points the capacity rows at a trial fleet decision. Vehicle types
    /// without routes in this cluster have no capacity row to update.
    pub fn apply_fleet(&mut self, fleet: &Fleet) {
        for (key, &row) in &self.rows {
            if let SubConstr::FleetCap { vt } = *key {
                let n = fleet.get(&(self.depot, vt)).copied().unwrap_or(0);
                self.model.set_rhs(row, n as f64);
            }
        }
    }

    /// Routes selected by the last solve.
    pub fn selected_routes(&self) -> Vec<SelectedRoute> {
        let values = self.model.var_values();
        let mut out = Vec::new();
        for &(vt, route, leased, hired) in &self.route_cols {
            if values[leased.0] > 0.5 {
                out.push(SelectedRoute { vt, route, hired: false });
            } else if values[hired.0] > 0.5 {
                out.push(SelectedRoute { vt, route, hired: true });
            }
        }
        return out;
    }

    /// Hired fleet sizes used by the last solve (callback variant only;
    /// empty otherwise).
    pub fn hired_fleet(&self) -> Map<VehicleTypeId, u32> {
        let values = self.model.var_values();
        let mut out = Map::default();
        for (key, &col) in &self.vars {
            if let SubVar::HiredFleet { vt } = key {
                out.insert(*vt, values[col.0].round() as u32);
            }
        }
        return out;
    }
}
