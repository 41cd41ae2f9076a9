use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::ThreadPoolBuilder;
use structopt::StructOpt;
use tracing::*;

use svrp::*;
use svrp::benders::{callback, two_phase, BendersOutcome};
use svrp::data::gen::{generate, GenOptions};
use svrp::data::{Params, VehicleType};
use svrp::lp::Milp;

#[derive(Debug, Copy, Clone)]
enum Engine {
    Loop,
    Callback,
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        return match s {
            "loop" => Ok(Self::Loop),
            "callback" => Ok(Self::Callback),
            _ => Err(format!("invalid string: {}", s)),
        };
    }
}

#[derive(Debug, StructOpt)]
struct ClArgs {
    /// RNG seed for instance generation and scenario sampling.
    #[structopt()]
    seed: u64,
    #[structopt(long, parse(try_from_str), possible_values=&["loop", "callback"], default_value="loop")]
    engine: Engine,
    #[structopt(long, short = "n", default_value = "12")]
    customers: usize,
    #[structopt(long, short = "z", default_value = "2")]
    zones: usize,
    #[structopt(long, default_value = "2")]
    shifts: usize,
    #[structopt(long, default_value = "5")]
    scenarios: usize,
    #[structopt(long, default_value = "3")]
    route_cap: usize,
    #[structopt(long, default_value = "0.0001")]
    eps: f64,
    #[structopt(long, default_value = "500")]
    max_iterations: usize,
    /// Time budget in seconds (loop engine only).
    #[structopt(long)]
    time_limit: Option<u64>,
    #[structopt(long, default_value = "0.8")]
    demand_mean: f64,
    #[structopt(long, default_value = "0.1")]
    demand_sd: f64,
    #[structopt(long, default_value = "0.1")]
    switch_prob: f64,
    #[structopt(long, default_value = "1.0")]
    lease_cost: f64,
    #[structopt(long, default_value = "3.0")]
    hire_cost: f64,
    #[structopt(long, default_value = "0")]
    min_fleet: u32,
    #[structopt(long, default_value = "4")]
    max_fleet: u32,
    #[structopt(long, default_value = "50.0")]
    depot_cost: f64,
    #[structopt(long, short = "c", default_value = "1")]
    cpus: usize,
    /// JSON solution report path.
    #[structopt(long, short = "o")]
    output: Option<PathBuf>,
    /// Convergence telemetry CSV path.
    #[structopt(long)]
    csv: Option<PathBuf>,
    /// Route listing CSV path.
    #[structopt(long)]
    routes: Option<PathBuf>,
    /// Cross-run stats CSV; one row is appended per run.
    #[structopt(long)]
    stats: Option<PathBuf>,
    /// JSON trace log path.
    #[structopt(long)]
    log: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args: ClArgs = StructOpt::from_args();
    let _g = init_logging(args.log.clone());
    debug!(?args);
    ThreadPoolBuilder::new().num_threads(args.cpus).build_global()
        .expect("Failed to construct thread pool");

    let opts = GenOptions {
        customers: args.customers,
        zones: args.zones,
        shifts: args.shifts,
        shift_switch_prob: args.switch_prob,
        demand_mean: args.demand_mean,
        demand_sd: args.demand_sd,
        depot_cost: args.depot_cost,
        vehicle_types: vec![VehicleType {
            id: VehicleTypeId(0),
            lease_cost: args.lease_cost,
            hire_cost: args.hire_cost,
            min_fleet: args.min_fleet,
            max_fleet: args.max_fleet,
        }],
        ..GenOptions::default()
    };
    let params = Params {
        scenarios_per_shift: args.scenarios,
        max_customers_per_route: args.route_cap,
        eps: args.eps,
        max_iterations: args.max_iterations,
        time_limit: args.time_limit.map(Duration::from_secs),
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let data = generate(format!("seed-{}", args.seed), &opts, params, &mut rng)?;
    info!(customers = data.customers.len(), depots = data.depots.len(), "instance ready");

    let outcome: BendersOutcome = match args.engine {
        Engine::Loop => two_phase::solve::<Milp, _>(&data, &mut rng)?,
        Engine::Callback => callback::solve::<Milp, _>(&data, &mut rng)?,
    };

    println!("termination: {}", outcome.termination);
    println!("zinf: {:.6}", outcome.zinf);
    println!("zsup: {:.6}", outcome.zsup);
    println!("iterations: {}", outcome.iterations);
    println!("cuts: {} optimality, {} feasibility", outcome.o_cuts, outcome.f_cuts);
    println!("time: {:.3}s", outcome.elapsed.as_secs_f64());

    if let Some(path) = &args.csv {
        outcome.log.write_csv(path)?;
    }
    if let Some(path) = &args.stats {
        outcome.append_stats_csv(&data.name, path)?;
    }
    match &outcome.solution {
        Some(sol) => {
            if let Some(path) = &args.output {
                sol.write_json(&data, path)?;
            }
            if let Some(path) = &args.routes {
                sol.write_routes_csv(path)?;
            }
        }
        None => warn!("no feasible fleet decision was found"),
    }

    Ok(())
}
