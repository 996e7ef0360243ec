use std::sync::Arc;

use crate::solver::constraints::ScratchData;
use crate::solver::moves::MoveStops;
use crate::solver::solution::{Solution, SolutionStop};

pub mod travel_duration_objective;
pub mod vehicles_duration_objective;

pub use travel_duration_objective::TravelDurationObjective;
pub use vehicles_duration_objective::VehiclesDurationObjective;

/// The objective capability contract: a cheap delta estimate for a proposed
/// move, a total value for a solution, and the same optional scratch hooks
/// constraints have.
pub trait Objective: Send + Sync {
    fn id(&self) -> &str;

    /// Estimated change of this objective's value if the move executes.
    /// Must not mutate solution state.
    fn estimate_delta_value(&self, solution: &Solution, mv: &MoveStops) -> f64;

    fn value(&self, solution: &Solution) -> f64;

    fn has_stop_data(&self) -> bool {
        false
    }

    fn update_stop_data(&self, stop: SolutionStop<'_>) -> Option<Box<dyn ScratchData>> {
        let _ = stop;
        None
    }

    fn has_solution_data(&self) -> bool {
        false
    }

    fn update_solution_data(&self, solution: &Solution) -> Option<Box<dyn ScratchData>> {
        let _ = solution;
        None
    }
}

/// One weighted term of the top-level objective.
pub struct ObjectiveTerm {
    factor: f64,
    objective: Arc<dyn Objective>,
}

impl ObjectiveTerm {
    pub fn new(factor: f64, objective: Arc<dyn Objective>) -> Self {
        ObjectiveTerm { factor, objective }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn objective(&self) -> &Arc<dyn Objective> {
        &self.objective
    }
}

/// The top-level objective: a weighted sum over terms. Term order is
/// registration order and defines both score layout and iteration order.
pub struct ObjectiveSum {
    terms: Vec<ObjectiveTerm>,
}

impl ObjectiveSum {
    pub fn new(terms: Vec<ObjectiveTerm>) -> Self {
        ObjectiveSum { terms }
    }

    pub fn terms(&self) -> &[ObjectiveTerm] {
        &self.terms
    }

    pub fn estimate_delta_value(&self, solution: &Solution, mv: &MoveStops) -> f64 {
        self.terms
            .iter()
            .map(|term| term.factor * term.objective.estimate_delta_value(solution, mv))
            .sum()
    }

    pub fn value(&self, solution: &Solution) -> f64 {
        self.terms
            .iter()
            .map(|term| term.factor * term.objective.value(solution))
            .sum()
    }
}
