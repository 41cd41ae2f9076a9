//! Exhaustive route enumeration for one depot and one vehicle type.
//!
//! Every customer subset up to the per-route cap becomes exactly one route,
//! carrying the cheapest visiting order for that subset. This is exponential
//! in the cap by design; the cap has to stay small (<= ~6) for this to be
//! tractable.

use itertools::Itertools;
use rayon::prelude::*;
use tracing::*;

use crate::*;
use crate::data::ProblemData;

/// One feasible delivery route: the depot, a visiting sequence, the depot
/// again. The distance is the minimum over all visiting orders of the
/// route's customer subset. Which vehicle serves the route is a solution
/// attribute, not a route attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: RouteId,
    pub stops: Vec<CustomerId>,
    pub distance: f64,
}

impl Route {
    #[inline]
    pub fn visits(&self, c: CustomerId) -> bool {
        // stops[0] and stops[last] are the depot
        self.stops[1..self.stops.len() - 1].contains(&c)
    }

    /// Number of customers on the route, excluding the depot brackets.
    #[inline]
    pub fn len(&self) -> usize {
        self.stops.len() - 2
    }
}

/// Enumerates one route per customer subset of size `1..=cap`.
///
/// Subsets of size >= 3 get a brute-force scan over all visiting orders
/// (exact small-scale TSP); below that the only order is already optimal.
/// Output order and distances are deterministic for a fixed input order.
#[instrument(level = "debug", skip(data, customers), fields(n = customers.len()))]
pub fn enumerate(data: &ProblemData, depot: CustomerId, customers: &[CustomerId], cap: usize) -> Vec<Route> {
    let cap = cap.min(customers.len());
    let subsets: Vec<Vec<CustomerId>> = (1..=cap)
        .flat_map(|k| customers.iter().copied().combinations(k))
        .collect();

    let mut routes: Vec<Route> = subsets.into_par_iter()
        .map(|subset| {
            let (order, distance) = best_order(data, depot, subset);
            let mut stops = Vec::with_capacity(order.len() + 2);
            stops.push(depot);
            stops.extend(order);
            stops.push(depot);
            Route { id: RouteId(0), stops, distance }
        })
        .collect();

    for (k, r) in routes.iter_mut().enumerate() {
        r.id = RouteId(k);
    }
    trace!(depot = %depot, count = routes.len(), "enumerated routes");
    return routes;
}

/// Cheapest depot-bracketed visiting order of `subset` and its length.
fn best_order(data: &ProblemData, depot: CustomerId, subset: Vec<CustomerId>) -> (Vec<CustomerId>, f64) {
    if subset.len() < 3 {
        let d = bracketed_length(data, depot, &subset);
        return (subset, d);
    }

    let n = subset.len();
    let mut best: Option<(Vec<CustomerId>, f64)> = None;
    for perm in subset.into_iter().permutations(n) {
        let d = bracketed_length(data, depot, &perm);
        match &best {
            Some((_, bd)) if *bd <= d => {}
            _ => best = Some((perm, d)),
        }
    }
    // n >= 3, so at least one permutation was scanned
    return best.unwrap();
}

fn bracketed_length(data: &ProblemData, depot: CustomerId, order: &[CustomerId]) -> f64 {
    let mut d = data.distance(depot, order[0]);
    d += data.route_length(order);
    d += data.distance(order[order.len() - 1], depot);
    return d;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Customer, Params, ProblemData, VehicleType};
    use itertools::Itertools;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn instance(coords: &[(f64, f64)]) -> ProblemData {
        let mut customers = Vec::new();
        let mut depot = Customer::new(CustomerId(0), coords[0].0, coords[0].1);
        depot.is_depot = true;
        customers.push(depot);
        for (k, &(x, y)) in coords.iter().enumerate().skip(1) {
            let mut c = Customer::new(CustomerId(k), x, y);
            c.accepted_vehicle_types = vec![VehicleTypeId(0)];
            customers.push(c);
        }
        let vt = VehicleType {
            id: VehicleTypeId(0), lease_cost: 1.0, hire_cost: 2.0, min_fleet: 0, max_fleet: 3,
        };
        let costs = crate::map!{ (CustomerId(0), VehicleTypeId(0)) => 5.0 };
        ProblemData::new(
            "routes-test", customers, vec![vt], costs,
            1, 0.1, 0.9, 0.0, Params::default(), &mut StdRng::seed_from_u64(42),
        ).unwrap()
    }

    #[test]
    fn small_subsets_take_the_direct_path() {
        let data = instance(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        let customers = [CustomerId(1), CustomerId(2)];
        let routes = enumerate(&data, CustomerId(0), &customers, 2);

        // {1}, {2}, {1,2}
        assert_eq!(routes.len(), 3);
        for r in &routes {
            assert_eq!(r.stops[0], CustomerId(0));
            assert_eq!(*r.stops.last().unwrap(), CustomerId(0));
            let direct: f64 = r.stops.windows(2)
                .map(|w| data.distance(w[0], w[1]))
                .sum();
            assert!((r.distance - direct).abs() < 1e-12);
        }
        let single = routes.iter().find(|r| r.stops == vec![CustomerId(0), CustomerId(1), CustomerId(0)]).unwrap();
        assert!((single.distance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cap_limits_subset_size() {
        let data = instance(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        let customers = [CustomerId(1), CustomerId(2), CustomerId(3)];
        let routes = enumerate(&data, CustomerId(0), &customers, 2);
        // 3 singletons + 3 pairs
        assert_eq!(routes.len(), 6);
        assert!(routes.iter().all(|r| r.len() <= 2));
    }

    #[test]
    fn enumeration_is_deterministic() {
        let data = instance(&[(0.0, 0.0), (3.0, 1.0), (1.0, 4.0), (5.0, 2.0), (2.0, 2.0)]);
        let customers = [CustomerId(1), CustomerId(2), CustomerId(3), CustomerId(4)];
        let a = enumerate(&data, CustomerId(0), &customers, 3);
        let b = enumerate(&data, CustomerId(0), &customers, 3);
        assert_eq!(a, b);
    }

    proptest! {
        /// The kept ordering of a size->=3 subset is minimal over the full
        /// permutation scan done independently here.
        #[test]
        fn route_distance_is_minimal_over_all_orders(
            coords in proptest::collection::vec((0.0f64..100.0, 0.0f64..100.0), 5..=6)
        ) {
            let data = instance(&coords);
            let customers = (1..coords.len()).map(CustomerId).collect_vec();
            let routes = enumerate(&data, CustomerId(0), &customers, customers.len());

            for r in routes.iter().filter(|r| r.len() >= 3) {
                let subset = r.stops[1..r.stops.len() - 1].to_vec();
                let n = subset.len();
                for perm in subset.into_iter().permutations(n) {
                    let d = bracketed_length(&data, CustomerId(0), &perm);
                    prop_assert!(r.distance <= d + 1e-9);
                }
            }
        }
    }
}
