//! Stochastic demand scenarios.
//!
//! A scenario is one sample of which customers are active in a shift, split
//! into per-depot clusters with their enumerated route sets. Scenarios are
//! built once per run and never mutated afterwards; the Benders engines only
//! vary which routes get *selected*.

use anyhow::Context;
use rand::Rng;
use tracing::*;

use crate::*;
use crate::data::ProblemData;
use crate::routes::{self, Route};

/// One depot's share of a scenario: the customers allocated to it and, per
/// accepting vehicle type, every feasible route over them. Vehicle types
/// without any usable route have no entry in `routes`.
#[derive(Debug)]
pub struct Cluster {
    pub id: usize,
    pub depot: CustomerId,
    pub customers: Vec<CustomerId>,
    pub routes: Map<VehicleTypeId, Vec<Route>>,
}

impl Cluster {
    fn new(id: usize, depot: CustomerId) -> Self {
        Cluster { id, depot, customers: Vec::new(), routes: Map::default() }
    }

    fn create_routes(&mut self, data: &ProblemData, vt: VehicleTypeId) {
        let accepting: Vec<CustomerId> = self.customers.iter()
            .copied()
            .filter(|&c| data.customer(c).accepts(vt))
            .collect();
        if accepting.is_empty() {
            return;
        }
        let rs = routes::enumerate(data, self.depot, &accepting, data.params.max_customers_per_route);
        self.routes.insert(vt, rs);
    }
}

/// One sampled realization of a (shift, scenario-index) pair.
#[derive(Debug)]
pub struct Scenario {
    pub shift: usize,
    pub index: usize,
    /// Sampled active customers (never includes depots).
    pub active: Vec<CustomerId>,
    /// One cluster per depot, in depot order.
    pub clusters: Vec<Cluster>,
}

impl Scenario {
    /// Samples the active customer set, allocates every active customer to
    /// its nearest depot and enumerates the cluster route sets.
    ///
    /// A customer without a reachable depot is a hard error here; dropping
    /// it silently would under-constrain every subproblem built from this
    /// scenario.
    #[instrument(level = "debug", skip(data, rng))]
    pub fn sample(data: &ProblemData, shift: usize, index: usize, rng: &mut impl Rng) -> Result<Self> {
        let dprob = data.demand_ratio(shift);
        // Odd shifts are day shifts.
        let is_day_shift = shift % 2 != 0;

        let mut active = Vec::new();
        for c in &data.customers {
            if c.is_depot {
                continue;
            }
            let p = if c.is_day_customer == is_day_shift { dprob } else { data.shift_switch_prob };
            if rng.gen::<f64>() <= p {
                active.push(c.id);
            }
        }

        let mut clusters: Vec<Cluster> = data.depots.iter()
            .enumerate()
            .map(|(k, &d)| Cluster::new(k, d))
            .collect();

        for &c in &active {
            let depot = data.closest_depot(c)
                .with_context(|| format!("allocating customer {} in shift {} scenario {}", c, shift, index))?;
            // depot list order == cluster order
            let k = data.depots.iter().position(|&d| d == depot).unwrap();
            clusters[k].customers.push(c);
        }

        for cluster in &mut clusters {
            for vt in &data.vehicle_types {
                cluster.create_routes(data, vt.id);
            }
        }

        debug!(shift, index, active = active.len(), "sampled scenario");
        return Ok(Scenario { shift, index, active, clusters });
    }

    /// Builds every (shift, scenario-index) pair of a run, indexed
    /// `[shift][scenario]`.
    pub fn build_all(data: &ProblemData, rng: &mut impl Rng) -> Result<Vec<Vec<Scenario>>> {
        info!(shifts = data.shifts, per_shift = data.params.scenarios_per_shift, "creating scenarios");
        let mut all = Vec::with_capacity(data.shifts);
        for t in 0..data.shifts {
            let mut row = Vec::with_capacity(data.params.scenarios_per_shift);
            for i in 0..data.params.scenarios_per_shift {
                row.push(Scenario::sample(data, t, i, rng)?);
            }
            all.push(row);
        }
        return Ok(all);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Customer, Params, VehicleType};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn instance() -> ProblemData {
        let mut customers = Vec::new();
        for (k, &(x, y, depot)) in [
            (0.0, 0.0, true),
            (10.0, 10.0, true),
            (1.0, 0.0, false),
            (9.0, 10.0, false),
            (2.0, 1.0, false),
        ].iter().enumerate() {
            let mut c = Customer::new(CustomerId(k), x, y);
            c.is_depot = depot;
            if !depot {
                c.accepted_vehicle_types = vec![VehicleTypeId(0)];
                c.is_day_customer = k % 2 == 0;
            }
            customers.push(c);
        }
        let vt = VehicleType {
            id: VehicleTypeId(0), lease_cost: 1.0, hire_cost: 2.0, min_fleet: 0, max_fleet: 3,
        };
        let costs = crate::map!{
            (CustomerId(0), VehicleTypeId(0)) => 5.0,
            (CustomerId(1), VehicleTypeId(0)) => 5.0
        };
        ProblemData::new(
            "scenario-test", customers, vec![vt], costs,
            2, 0.3, 0.95, 0.0, Params::default(), &mut StdRng::seed_from_u64(7),
        ).unwrap()
    }

    #[test]
    fn every_active_customer_lands_in_its_nearest_cluster() {
        let data = instance();
        let mut rng = StdRng::seed_from_u64(99);
        for t in 0..data.shifts {
            let s = Scenario::sample(&data, t, 0, &mut rng).unwrap();
            assert_eq!(s.clusters.len(), data.depots.len());

            for &c in &s.active {
                let owners: Vec<_> = s.clusters.iter()
                    .filter(|cl| cl.customers.contains(&c))
                    .collect();
                assert_eq!(owners.len(), 1, "customer {} in {} clusters", c, owners.len());
                let owner = owners[0];
                // the owning depot is nearest among all depots
                for &d in &data.depots {
                    assert!(data.distance(c, owner.depot) <= data.distance(c, d) + 1e-12);
                }
            }
        }
    }

    #[test]
    fn depots_are_never_sampled_as_customers() {
        let data = instance();
        let mut rng = StdRng::seed_from_u64(3);
        for i in 0..10 {
            let s = Scenario::sample(&data, 0, i, &mut rng).unwrap();
            for &c in &s.active {
                assert!(!data.customer(c).is_depot);
            }
        }
    }

    #[test]
    fn cluster_routes_only_visit_accepting_cluster_customers() {
        let data = instance();
        let mut rng = StdRng::seed_from_u64(11);
        let s = Scenario::sample(&data, 1, 0, &mut rng).unwrap();
        for cl in &s.clusters {
            for (&vt, rs) in &cl.routes {
                for r in rs {
                    assert_eq!(r.stops[0], cl.depot);
                    assert_eq!(*r.stops.last().unwrap(), cl.depot);
                    for &c in &r.stops[1..r.stops.len() - 1] {
                        assert!(cl.customers.contains(&c));
                        assert!(data.customer(c).accepts(vt));
                    }
                }
            }
        }
    }

    #[test]
    fn certain_demand_activates_every_primary_customer() {
        let mut data = instance();
        data.demand_distribution = vec![2.0, 2.0]; // clamps to 1.0
        let mut rng = StdRng::seed_from_u64(5);
        let s = Scenario::sample(&data, 1, 0, &mut rng).unwrap();
        // shift 1 is a day shift; every day customer must be active
        for c in &data.customers {
            if !c.is_depot && c.is_day_customer {
                assert!(s.active.contains(&c.id));
            }
        }
    }
}
