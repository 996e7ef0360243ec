use thiserror::Error;

pub mod output;
pub mod plan_units;
#[allow(clippy::module_inception)]
pub mod solution;
pub mod solution_stop;
pub mod solution_vehicle;

pub use plan_units::PlanUnitCollection;
pub use solution::{ConstraintViolation, Solution};
pub use solution_stop::SolutionStop;
pub use solution_vehicle::SolutionVehicle;

/// Structural failures while building or repairing a solution. Everything a
/// caller can legitimately cause is reported here; bugs fail fast instead.
#[derive(Debug, Error)]
pub enum SolutionError {
    #[error(
        "infeasible initial solution: vehicle `{vehicle}` violates constraint `{constraint}` \
         for stops [{stops}]"
    )]
    InfeasibleInitialSolution {
        vehicle: String,
        constraint: String,
        stops: String,
    },
    #[error(
        "infeasible initial solution: stop `{stop}` on vehicle `{vehicle}` is part of a one-of \
         plan unit which is already planned"
    )]
    OneOfAlreadyPlanned { stop: String, vehicle: String },
    #[error("infeasible initial solution at start of vehicle `{vehicle}`: {constraint}")]
    InfeasibleAtVehicleStart { vehicle: String, constraint: String },
    #[error(
        "no feasible route from start to end found for vehicle `{vehicle}` due to constraint \
         `{constraint}`, no further stops to remove"
    )]
    NoRemovableStop { vehicle: String, constraint: String },
    #[error("vehicle `{vehicle}` is infeasible when empty: {constraint}")]
    EmptyVehicleInfeasible { vehicle: String, constraint: String },
    #[error("failed undoing an unplan that left the solution infeasible")]
    UnplanRestoreFailed,
}
