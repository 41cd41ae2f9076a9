//! Seeded synthetic instances.
//!
//! Customers are scattered uniformly over a square, the square is split into
//! zones by recursive bisection (always halving the current widest group
//! along its wider axis) and one customer per zone is promoted to a depot.

use rand::Rng;
use tracing::*;

use crate::*;
use super::{Cost, Customer, Params, ProblemData, VehicleType};

#[derive(Debug, Clone)]
pub struct GenOptions {
    /// Total node count, depots included.
    pub customers: usize,
    /// Zone count; one depot per zone.
    pub zones: usize,
    pub side: f64,
    pub shifts: usize,
    pub shift_switch_prob: f64,
    pub demand_mean: f64,
    pub demand_sd: f64,
    /// Probability that a non-depot is a day customer.
    pub day_customer_prob: f64,
    /// Probability that a customer accepts each vehicle type (at least one
    /// is always accepted).
    pub accept_prob: f64,
    /// Base per-vehicle stationing cost; per (depot, type) costs are drawn
    /// within 20% of it.
    pub depot_cost: Cost,
    pub vehicle_types: Vec<VehicleType>,
}

impl Default for GenOptions {
    fn default() -> Self {
        GenOptions {
            customers: 12,
            zones: 2,
            side: 100.0,
            shifts: 2,
            shift_switch_prob: 0.1,
            demand_mean: 0.8,
            demand_sd: 0.1,
            day_customer_prob: 0.5,
            accept_prob: 0.75,
            depot_cost: 50.0,
            vehicle_types: vec![VehicleType {
                id: VehicleTypeId(0),
                lease_cost: 1.0,
                hire_cost: 3.0,
                min_fleet: 0,
                max_fleet: 4,
            }],
        }
    }
}

/// Generates a validated instance. The same options and seed always yield
/// the same instance.
#[instrument(level = "info", skip(name, opts, params, rng), fields(customers = opts.customers, zones = opts.zones))]
pub fn generate(name: impl Into<String>, opts: &GenOptions, params: Params, rng: &mut impl Rng) -> Result<ProblemData> {
    if opts.zones == 0 || opts.zones > opts.customers {
        anyhow::bail!("cannot place {} zones over {} customers", opts.zones, opts.customers);
    }
    if opts.vehicle_types.is_empty() {
        anyhow::bail!("at least one vehicle type is required");
    }

    let mut customers: Vec<Customer> = (0..opts.customers)
        .map(|k| Customer::new(
            CustomerId(k),
            rng.gen_range(0.0, opts.side),
            rng.gen_range(0.0, opts.side),
        ))
        .collect();

    let zones = bisect_zones(&customers, opts.zones);
    for (z, members) in zones.iter().enumerate() {
        for &k in members {
            customers[k].zone = z as i32;
        }
        let depot = members[rng.gen_range(0, members.len())];
        customers[depot].is_depot = true;
    }

    let nvt = opts.vehicle_types.len();
    for c in customers.iter_mut().filter(|c| !c.is_depot) {
        c.is_day_customer = rng.gen_bool(opts.day_customer_prob);
        for vt in 0..nvt {
            if rng.gen_bool(opts.accept_prob) {
                c.accepted_vehicle_types.push(VehicleTypeId(vt));
            }
        }
        if c.accepted_vehicle_types.is_empty() {
            c.accepted_vehicle_types.push(VehicleTypeId(rng.gen_range(0, nvt)));
        }
    }

    let mut depot_costs = Map::default();
    for c in customers.iter().filter(|c| c.is_depot) {
        for vt in &opts.vehicle_types {
            let cost = opts.depot_cost * rng.gen_range(0.8, 1.2);
            depot_costs.insert((c.id, vt.id), cost);
        }
    }

    debug!(depots = opts.zones, "generated instance");
    return ProblemData::new(
        name,
        customers,
        opts.vehicle_types.clone(),
        depot_costs,
        opts.shifts,
        opts.shift_switch_prob,
        opts.demand_mean,
        opts.demand_sd,
        params,
        rng,
    );
}

/// Splits the customer index set into `zones` groups: repeatedly take the
/// largest group, sort it along its wider axis and cut at the median.
fn bisect_zones(customers: &[Customer], zones: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = vec![(0..customers.len()).collect()];
    while groups.len() < zones {
        let widest = groups.iter()
            .enumerate()
            .max_by_key(|(_, g)| g.len())
            .map(|(k, _)| k)
            .unwrap();
        let mut g = groups.swap_remove(widest);

        let (min_x, max_x) = min_max(g.iter().map(|&k| customers[k].x));
        let (min_y, max_y) = min_max(g.iter().map(|&k| customers[k].y));
        if max_x - min_x >= max_y - min_y {
            g.sort_by(|&a, &b| customers[a].x.partial_cmp(&customers[b].x).unwrap());
        } else {
            g.sort_by(|&a, &b| customers[a].y.partial_cmp(&customers[b].y).unwrap());
        }

        let rest = g.split_off(g.len() / 2);
        groups.push(g);
        groups.push(rest);
    }
    return groups;
}

fn min_max(it: impl Iterator<Item = f64>) -> (f64, f64) {
    it.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn produces_one_depot_per_zone() {
        let opts = GenOptions { customers: 20, zones: 4, ..GenOptions::default() };
        let mut rng = StdRng::seed_from_u64(17);
        let data = generate("gen-test", &opts, Params::default(), &mut rng).unwrap();

        assert_eq!(data.depots.len(), 4);
        for z in 0..4i32 {
            let in_zone = data.customers.iter()
                .filter(|c| c.zone == z && c.is_depot)
                .count();
            assert_eq!(in_zone, 1, "zone {} has {} depots", z, in_zone);
        }
    }

    #[test]
    fn every_non_depot_accepts_a_vehicle_type() {
        let mut opts = GenOptions { customers: 30, zones: 3, ..GenOptions::default() };
        opts.accept_prob = 0.05;
        opts.vehicle_types.push(VehicleType {
            id: VehicleTypeId(1), lease_cost: 2.0, hire_cost: 5.0, min_fleet: 0, max_fleet: 2,
        });
        let mut rng = StdRng::seed_from_u64(23);
        let data = generate("gen-test", &opts, Params::default(), &mut rng).unwrap();
        for c in data.customers.iter().filter(|c| !c.is_depot) {
            assert!(!c.accepted_vehicle_types.is_empty());
        }
    }

    #[test]
    fn same_seed_same_instance() {
        let opts = GenOptions::default();
        let a = generate("a", &opts, Params::default(), &mut StdRng::seed_from_u64(5)).unwrap();
        let b = generate("b", &opts, Params::default(), &mut StdRng::seed_from_u64(5)).unwrap();
        for (ca, cb) in a.customers.iter().zip(&b.customers) {
            assert_eq!(ca.x, cb.x);
            assert_eq!(ca.y, cb.y);
            assert_eq!(ca.is_depot, cb.is_depot);
            assert_eq!(ca.accepted_vehicle_types, cb.accepted_vehicle_types);
        }
    }

    #[test]
    fn rejects_more_zones_than_customers() {
        let opts = GenOptions { customers: 2, zones: 5, ..GenOptions::default() };
        let mut rng = StdRng::seed_from_u64(0);
        assert!(generate("bad", &opts, Params::default(), &mut rng).is_err());
    }
}
