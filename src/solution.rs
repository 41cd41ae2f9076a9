//! Recording and serializing a finished first-stage decision together with
//! the route selections that priced it.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use itertools::Itertools;

use crate::*;
use crate::data::ProblemData;
use crate::model::Fleet;

/// One route selected in one scenario of the recorded solution.
#[derive(Debug, Clone)]
pub struct SolutionRoute {
    pub shift: usize,
    pub scenario: usize,
    pub depot: CustomerId,
    pub vt: VehicleTypeId,
    pub hired: bool,
    pub stops: Vec<CustomerId>,
    pub distance: f64,
}

/// A priced first-stage decision. The hired fleet is the worst case over
/// scenarios: per (depot, vehicle type), the most hired vehicles any single
/// scenario needed.
#[derive(Debug, Clone)]
pub struct ProblemSolution {
    pub instance: String,
    /// Fixed fleet cost plus expected second-stage cost.
    pub objective: f64,
    pub fixed_cost: f64,
    pub leased_fleet: Fleet,
    pub hired_fleet: Map<(CustomerId, VehicleTypeId), u32>,
    pub routes: Vec<SolutionRoute>,
}

impl ProblemSolution {
    /// Folds one scenario's hired-route counts into the worst-case hired
    /// fleet.
    pub fn merge_hired(&mut self, counts: &Map<(CustomerId, VehicleTypeId), u32>) {
        for (&key, &n) in counts {
            let entry = self.hired_fleet.entry(key).or_insert(0);
            *entry = (*entry).max(n);
        }
    }

    pub fn to_json(&self, data: &ProblemData) -> json::JsonValue {
        let leased: Vec<json::JsonValue> = self.leased_fleet.iter()
            .sorted_by_key(|(&(d, vt), _)| (d, vt))
            .filter(|(_, &n)| n > 0)
            .map(|(&(d, vt), &n)| json::object! {
                depot: d.0,
                vehicle_type: vt.0,
                count: n,
                unit_cost: data.depot_costs[&(d, vt)],
            })
            .collect();
        let hired: Vec<json::JsonValue> = self.hired_fleet.iter()
            .sorted_by_key(|(&(d, vt), _)| (d, vt))
            .filter(|(_, &n)| n > 0)
            .map(|(&(d, vt), &n)| json::object! {
                depot: d.0,
                vehicle_type: vt.0,
                count: n,
            })
            .collect();
        let routes: Vec<json::JsonValue> = self.routes.iter()
            .map(|r| json::object! {
                shift: r.shift,
                scenario: r.scenario,
                depot: r.depot.0,
                vehicle_type: r.vt.0,
                hired: r.hired,
                distance: r.distance,
                stops: r.stops.iter().map(|c| c.0).collect_vec(),
            })
            .collect();

        return json::object! {
            instance: self.instance.clone(),
            objective: self.objective,
            fixed_cost: self.fixed_cost,
            leased_fleet: leased,
            hired_fleet: hired,
            routes: routes,
        };
    }

    pub fn write_json(&self, data: &ProblemData, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut f = File::create(path)
            .with_context(|| format!("creating solution report {:?}", path))?;
        self.to_json(data).write_pretty(&mut f, 2)?;
        Ok(())
    }

    /// Route listing, one row per selected route.
    pub fn routes_csv(&self) -> String {
        let mut out = String::from("Shift; Scenario; Depot; VehicleType; Hired; Distance; Stops\n");
        for r in &self.routes {
            let stops = r.stops.iter().map(|c| c.0.to_string()).join("-");
            out.push_str(&format!(
                "{}; {}; {}; {}; {}; {:.6}; {}\n",
                r.shift, r.scenario, r.depot, r.vt, r.hired as u8, r.distance, stops,
            ));
        }
        return out;
    }

    pub fn write_routes_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut f = File::create(path)
            .with_context(|| format!("creating route listing {:?}", path))?;
        f.write_all(self.routes_csv().as_bytes())
            .with_context(|| format!("writing route listing {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_solution() -> ProblemSolution {
        let mut leased = Fleet::default();
        leased.insert((CustomerId(0), VehicleTypeId(0)), 2);
        ProblemSolution {
            instance: "t".into(),
            objective: 31.5,
            fixed_cost: 20.0,
            leased_fleet: leased,
            hired_fleet: Map::default(),
            routes: vec![SolutionRoute {
                shift: 0,
                scenario: 1,
                depot: CustomerId(0),
                vt: VehicleTypeId(0),
                hired: false,
                stops: vec![CustomerId(0), CustomerId(3), CustomerId(2), CustomerId(0)],
                distance: 7.25,
            }],
        }
    }

    #[test]
    fn merge_hired_takes_the_per_key_maximum() {
        let mut sol = sample_solution();
        let a = crate::map!{ (CustomerId(0), VehicleTypeId(0)) => 2 };
        let b = crate::map!{
            (CustomerId(0), VehicleTypeId(0)) => 1,
            (CustomerId(1), VehicleTypeId(0)) => 3
        };
        sol.merge_hired(&a);
        sol.merge_hired(&b);
        assert_eq!(sol.hired_fleet[&(CustomerId(0), VehicleTypeId(0))], 2);
        assert_eq!(sol.hired_fleet[&(CustomerId(1), VehicleTypeId(0))], 3);
    }

    #[test]
    fn route_listing_encodes_stops_as_a_path() {
        let sol = sample_solution();
        let csv = sol.routes_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "Shift; Scenario; Depot; VehicleType; Hired; Distance; Stops");
        assert_eq!(lines.next().unwrap(), "0; 1; 0; 0; 0; 7.250000; 0-3-2-0");
    }
}
