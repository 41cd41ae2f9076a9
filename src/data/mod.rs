use std::time::Duration;

use anyhow::bail;
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::*;

use crate::*;

pub mod gen;

pub type Cost = f64;

/// A node of the instance. Depots are customers with `is_depot` set; both
/// flags are fixed once the instance is constructed.
#[derive(Debug, Clone)]
pub struct Customer {
    pub id: CustomerId,
    pub x: f64,
    pub y: f64,
    pub zone: i32,
    pub is_depot: bool,
    pub is_day_customer: bool,
    pub accepted_vehicle_types: Vec<VehicleTypeId>,
}

impl Customer {
    pub fn new(id: CustomerId, x: f64, y: f64) -> Self {
        Customer {
            id,
            x,
            y,
            zone: -1,
            is_depot: false,
            is_day_customer: false,
            accepted_vehicle_types: Vec::new(),
        }
    }

    pub fn accepts(&self, vt: VehicleTypeId) -> bool {
        self.accepted_vehicle_types.contains(&vt)
    }
}

/// Static description of one vehicle type. Lease/hire costs are per unit
/// distance; the fleet bounds apply across all depots.
#[derive(Debug, Clone)]
pub struct VehicleType {
    pub id: VehicleTypeId,
    pub lease_cost: Cost,
    pub hire_cost: Cost,
    pub min_fleet: u32,
    pub max_fleet: u32,
}

/// Run parameters. `max_iterations` and `time_limit` bound the Benders loop
/// explicitly; the gap tolerance alone cannot guarantee termination.
#[derive(Debug, Clone)]
pub struct Params {
    pub scenarios_per_shift: usize,
    pub max_customers_per_route: usize,
    pub eps: f64,
    pub max_iterations: usize,
    pub time_limit: Option<Duration>,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            scenarios_per_shift: 5,
            max_customers_per_route: 3,
            eps: 1e-4,
            max_iterations: 500,
            time_limit: None,
        }
    }
}

/// The static instance: read-only once constructed. Scenarios are *not*
/// stored here; they are owned by the engine driving a run.
#[derive(Debug)]
pub struct ProblemData {
    pub name: String,
    pub customers: Vec<Customer>,
    pub depots: Vec<CustomerId>,
    pub vehicle_types: Vec<VehicleType>,
    /// Fixed per-vehicle cost of stationing one vehicle of a type at a depot.
    pub depot_costs: Map<(CustomerId, VehicleTypeId), Cost>,
    pub shifts: usize,
    /// Probability that a customer of the "other" affinity group shows up in
    /// a shift anyway.
    pub shift_switch_prob: f64,
    /// One demand-ratio draw per shift, shared by all scenarios of the shift.
    pub demand_distribution: Vec<f64>,
    distances: Array2<f64>,
    pub params: Params,
}

impl ProblemData {
    /// Validates the instance and builds the distance index. Fails fast on
    /// structural defects instead of letting them surface as silently
    /// missing constraints later on.
    pub fn new(
        name: impl Into<String>,
        customers: Vec<Customer>,
        vehicle_types: Vec<VehicleType>,
        depot_costs: Map<(CustomerId, VehicleTypeId), Cost>,
        shifts: usize,
        shift_switch_prob: f64,
        demand_mean: f64,
        demand_sd: f64,
        params: Params,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let name = name.into();
        if shifts == 0 {
            bail!("instance {}: must have at least one shift", name);
        }
        if params.scenarios_per_shift == 0 {
            bail!("instance {}: must have at least one scenario per shift", name);
        }
        if !(0.0..=1.0).contains(&shift_switch_prob) {
            bail!("instance {}: shift switch probability {} outside [0, 1]", name, shift_switch_prob);
        }

        for (k, c) in customers.iter().enumerate() {
            if c.id != CustomerId(k) {
                bail!("instance {}: customer at position {} carries id {}", name, k, c.id);
            }
            if !c.x.is_finite() || !c.y.is_finite() {
                bail!("instance {}: customer {} has non-finite coordinates", name, c.id);
            }
            for &vt in &c.accepted_vehicle_types {
                if vt.0 >= vehicle_types.len() {
                    bail!("instance {}: customer {} accepts undefined vehicle type {}", name, c.id, vt);
                }
            }
            if !c.is_depot && c.accepted_vehicle_types.is_empty() {
                bail!("instance {}: customer {} accepts no vehicle type and can never be served", name, c.id);
            }
        }

        let depots: Vec<CustomerId> = customers.iter()
            .filter(|c| c.is_depot)
            .map(|c| c.id)
            .collect();
        if depots.is_empty() {
            bail!("instance {}: no depots", name);
        }

        for &d in &depots {
            for vt in &vehicle_types {
                if !depot_costs.contains_key(&(d, vt.id)) {
                    bail!("instance {}: no fixed cost for depot {} / vehicle type {}", name, d, vt.id);
                }
            }
        }
        for vt in &vehicle_types {
            if vt.min_fleet > vt.max_fleet {
                bail!("instance {}: vehicle type {} has min fleet {} > max fleet {}",
                      name, vt.id, vt.min_fleet, vt.max_fleet);
            }
        }

        let distances = compute_distances(&customers);

        // One draw per shift; all scenarios of a shift share it.
        let normal = Normal::new(demand_mean, demand_sd)
            .map_err(|e| anyhow::anyhow!("instance {}: bad demand distribution parameters: {:?}", name, e))?;
        let demand_distribution: Vec<f64> = (0..shifts)
            .map(|_| normal.sample(rng))
            .collect();
        debug!(?demand_distribution, "drew per-shift demand ratios");

        return Ok(ProblemData {
            name,
            customers,
            depots,
            vehicle_types,
            depot_costs,
            shifts,
            shift_switch_prob,
            demand_distribution,
            distances,
            params,
        });
    }

    #[inline]
    pub fn customer(&self, id: CustomerId) -> &Customer {
        &self.customers[id.0]
    }

    #[inline]
    pub fn vehicle_type(&self, id: VehicleTypeId) -> &VehicleType {
        &self.vehicle_types[id.0]
    }

    #[inline]
    pub fn distance(&self, a: CustomerId, b: CustomerId) -> f64 {
        self.distances[(a.0, b.0)]
    }

    /// Total length of a depot-bracketed visiting sequence.
    pub fn route_length(&self, stops: &[CustomerId]) -> f64 {
        stops.windows(2).map(|w| self.distance(w[0], w[1])).sum()
    }

    /// Nearest depot to `c`, ties broken by lowest depot id. The depot list
    /// is non-empty by construction, so this only fails for a depot-less
    /// instance that slipped past validation.
    pub fn closest_depot(&self, c: CustomerId) -> Result<CustomerId> {
        let best = self.depots.iter()
            .map(|&d| (self.distance(c, d), d))
            .fold(None, |best: Option<(f64, CustomerId)>, cand| match best {
                None => Some(cand),
                Some(b) => {
                    if cand.0 < b.0 || (cand.0 == b.0 && cand.1 < b.1) { Some(cand) } else { Some(b) }
                }
            });
        match best {
            Some((_, d)) => Ok(d),
            None => bail!("customer {} has no reachable depot", c),
        }
    }

    /// Demand ratio for a shift, clamped into [0, 1] so it can be used as a
    /// sampling probability directly.
    pub fn demand_ratio(&self, shift: usize) -> f64 {
        self.demand_distribution[shift].max(0.0).min(1.0)
    }
}

fn compute_distances(customers: &[Customer]) -> Array2<f64> {
    let n = customers.len();
    let mut d = Array2::zeros((n, n));
    for c1 in customers {
        for c2 in customers {
            if c1.id == c2.id {
                continue;
            }
            let dist = ((c2.x - c1.x).powi(2) + (c2.y - c1.y).powi(2)).sqrt();
            d[(c1.id.0, c2.id.0)] = dist;
        }
    }
    return d;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn vt(id: usize, max: u32) -> VehicleType {
        VehicleType { id: VehicleTypeId(id), lease_cost: 1.0, hire_cost: 2.0, min_fleet: 0, max_fleet: max }
    }

    #[test]
    fn rejects_instance_without_depots() {
        let mut c = Customer::new(CustomerId(0), 0.0, 0.0);
        c.accepted_vehicle_types = vec![VehicleTypeId(0)];
        let r = ProblemData::new(
            "t", vec![c], vec![vt(0, 2)], Map::default(),
            1, 0.1, 0.8, 0.0, Params::default(), &mut StdRng::seed_from_u64(0),
        );
        assert!(r.is_err());
    }

    #[test]
    fn rejects_undefined_vehicle_type() {
        let mut d = Customer::new(CustomerId(0), 0.0, 0.0);
        d.is_depot = true;
        let mut c = Customer::new(CustomerId(1), 1.0, 1.0);
        c.accepted_vehicle_types = vec![VehicleTypeId(7)];
        let costs = map!{ (CustomerId(0), VehicleTypeId(0)) => 10.0 };
        let r = ProblemData::new(
            "t", vec![d, c], vec![vt(0, 2)], costs,
            1, 0.1, 0.8, 0.0, Params::default(), &mut StdRng::seed_from_u64(0),
        );
        assert!(r.is_err());
    }

    #[test]
    fn rejects_negative_demand_deviation() {
        let mut d = Customer::new(CustomerId(0), 0.0, 0.0);
        d.is_depot = true;
        let mut c = Customer::new(CustomerId(1), 1.0, 1.0);
        c.accepted_vehicle_types = vec![VehicleTypeId(0)];
        let costs = map!{ (CustomerId(0), VehicleTypeId(0)) => 10.0 };
        let r = ProblemData::new(
            "t", vec![d, c], vec![vt(0, 2)], costs,
            1, 0.1, 0.8, -1.0, Params::default(), &mut StdRng::seed_from_u64(0),
        );
        let msg = format!("{}", r.unwrap_err());
        assert!(msg.contains("demand distribution"));
    }

    #[test]
    fn distance_index_is_symmetric_euclidean() {
        let mut d = Customer::new(CustomerId(0), 0.0, 0.0);
        d.is_depot = true;
        let mut c = Customer::new(CustomerId(1), 3.0, 4.0);
        c.accepted_vehicle_types = vec![VehicleTypeId(0)];
        let costs = map!{ (CustomerId(0), VehicleTypeId(0)) => 10.0 };
        let pdata = ProblemData::new(
            "t", vec![d, c], vec![vt(0, 2)], costs,
            1, 0.1, 0.8, 0.0, Params::default(), &mut StdRng::seed_from_u64(0),
        ).unwrap();
        assert!((pdata.distance(CustomerId(0), CustomerId(1)) - 5.0).abs() < 1e-12);
        assert!((pdata.distance(CustomerId(1), CustomerId(0)) - 5.0).abs() < 1e-12);
        assert_eq!(pdata.distance(CustomerId(0), CustomerId(0)), 0.0);
    }

    #[test]
    fn closest_depot_breaks_ties_by_lowest_id() {
        let mut d0 = Customer::new(CustomerId(0), -1.0, 0.0);
        d0.is_depot = true;
        let mut d1 = Customer::new(CustomerId(1), 1.0, 0.0);
        d1.is_depot = true;
        let mut c = Customer::new(CustomerId(2), 0.0, 0.0);
        c.accepted_vehicle_types = vec![VehicleTypeId(0)];
        let costs = map!{
            (CustomerId(0), VehicleTypeId(0)) => 10.0,
            (CustomerId(1), VehicleTypeId(0)) => 10.0
        };
        let pdata = ProblemData::new(
            "t", vec![d0, d1, c], vec![vt(0, 2)], costs,
            1, 0.1, 0.8, 0.0, Params::default(), &mut StdRng::seed_from_u64(0),
        ).unwrap();
        assert_eq!(pdata.closest_depot(CustomerId(2)).unwrap(), CustomerId(0));
    }

    #[test]
    fn demand_ratio_is_clamped() {
        let mut d = Customer::new(CustomerId(0), 0.0, 0.0);
        d.is_depot = true;
        let mut c = Customer::new(CustomerId(1), 1.0, 0.0);
        c.accepted_vehicle_types = vec![VehicleTypeId(0)];
        let costs = map!{ (CustomerId(0), VehicleTypeId(0)) => 10.0 };
        let pdata = ProblemData::new(
            "t", vec![d, c], vec![vt(0, 2)], costs,
            4, 0.1, 3.0, 0.0, Params::default(), &mut StdRng::seed_from_u64(0),
        ).unwrap();
        for t in 0..4 {
            let p = pdata.demand_ratio(t);
            assert!((0.0..=1.0).contains(&p));
        }
    }
}
