//! Master and subproblem construction.
//!
//! Variables and constraints are identified by typed composite keys mapped
//! to dense solver columns/rows; string names exist only as debug labels on
//! the solver side, never as an identity mechanism.

use crate::*;

pub mod master;
pub mod sub;

pub use master::{build_master, Master, MasterIndex, Trial};
pub use sub::{build_subproblem, SelectedRoute, Subproblem};

/// Master-problem variable keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MasterVar {
    /// Binary "digit": fleet of exactly `digit` vehicles of `vt` at `depot`.
    FleetDigit { depot: CustomerId, vt: VehicleTypeId, digit: u32 },
    /// Second-stage cost proxy for one (shift, scenario, depot).
    Alpha { shift: usize, scenario: usize, depot: CustomerId },
    /// Expected second-stage cost per (shift, depot); the only alpha term
    /// carrying objective weight.
    AlphaH { shift: usize, depot: CustomerId },
}

/// Master-problem structural constraint keys. Cuts are tracked separately
/// by the engines (they are unbounded in number and never looked up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MasterConstr {
    /// Exactly one digit per (depot, vehicle type).
    OneHot { depot: CustomerId, vt: VehicleTypeId },
    MinFleet { vt: VehicleTypeId },
    MaxFleet { vt: VehicleTypeId },
    /// alphaH = average of the per-scenario alphas.
    AlphaLink { shift: usize, depot: CustomerId },
}

/// Subproblem variable keys (scoped to one (shift, scenario, depot)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubVar {
    Leased { vt: VehicleTypeId, route: RouteId },
    Hired { vt: VehicleTypeId, route: RouteId },
    /// Number of hired vehicles of a type actually used (callback variant).
    HiredFleet { vt: VehicleTypeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubConstr {
    FleetCap { vt: VehicleTypeId },
    Cover { customer: CustomerId },
    HiredLink { vt: VehicleTypeId },
}

/// A first-stage decision: fleet size per (depot, vehicle type).
pub type Fleet = Map<(CustomerId, VehicleTypeId), u32>;
