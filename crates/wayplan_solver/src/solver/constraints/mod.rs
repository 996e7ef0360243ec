use std::any::Any;
use std::sync::Arc;

use crate::model::expression::Expression;
use crate::model::model::Model;
use crate::solver::moves::MoveStops;
use crate::solver::solution::{Solution, SolutionStop, SolutionVehicle};

pub mod attributes_constraint;
pub mod maximum_constraint;

pub use attributes_constraint::AttributesConstraint;
pub use maximum_constraint::MaximumConstraint;

/// Where a constraint's full check runs during incremental evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckGranularity {
    AtEachStop,
    AtEachVehicle,
    AtEachSolution,
}

/// Advisory pruning information returned alongside a violated estimate.
/// `SkipVehicle` prunes the remaining candidate positions on the current
/// vehicle; `SkipPlanUnit` prunes the plan unit on the current vehicle
/// altogether.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionsHint {
    #[default]
    None,
    SkipVehicle,
    SkipPlanUnit,
}

/// Opaque per-stop or per-solution auxiliary state maintained by a
/// constraint or objective. Deep-copied explicitly when a solution is
/// copied.
pub trait ScratchData: Send + Sync {
    fn clone_box(&self) -> Box<dyn ScratchData>;

    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn ScratchData> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// The constraint capability contract. `estimate_is_violated` is the cheap
/// pre-check the best-move search runs on every candidate; the remaining
/// hooks are optional and partitioned once at model build so the evaluator
/// never re-probes (`has_stop_data` / `has_solution_data` gate the scratch
/// updaters, `granularity` selects which full check runs).
pub trait Constraint: Send + Sync {
    fn id(&self) -> &str;

    fn granularity(&self) -> CheckGranularity;

    /// Temporal constraints opt out of temporal-blind passes, used by the
    /// initial-solution loader to admit routes before repairing time
    /// violations by removal.
    fn is_temporal(&self) -> bool {
        false
    }

    /// Expressions the evaluator must maintain for this constraint.
    fn expressions(&self) -> Vec<Arc<dyn Expression>> {
        Vec::new()
    }

    /// Runs once when the model locks; the place for precomputation that
    /// needs the complete model.
    fn lock(&self, model: &Model) {
        let _ = model;
    }

    /// Cheap check on a proposed move. Must not mutate solution state.
    fn estimate_is_violated(&self, solution: &Solution, mv: &MoveStops) -> (bool, PositionsHint);

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

    fn is_stop_violated(&self, stop: SolutionStop<'_>) -> bool {
        let _ = stop;
        false
    }

    fn is_vehicle_violated(&self, vehicle: SolutionVehicle<'_>) -> bool {
        let _ = vehicle;
        false
    }

    fn is_solution_violated(&self, solution: &Solution) -> bool {
        let _ = solution;
        false
    }
}
