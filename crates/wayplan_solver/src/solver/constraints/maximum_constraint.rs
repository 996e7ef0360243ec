use std::sync::Arc;

use crate::model::expression::Expression;
use crate::solver::constraints::{CheckGranularity, Constraint, PositionsHint};
use crate::solver::moves::MoveStops;
use crate::solver::solution::{Solution, SolutionStop};

/// Bounds the cumulative value of an expression along every route by a
/// per-vehicle-type limit expression. The generic form behind distance and
/// duration limits.
pub struct MaximumConstraint {
    id: String,
    expression: Arc<dyn Expression>,
    limit: Arc<dyn Expression>,
}

impl MaximumConstraint {
    pub fn new(expression: Arc<dyn Expression>, limit: Arc<dyn Expression>) -> Self {
        MaximumConstraint {
            id: format!("maximum[{}]", expression.name()),
            expression,
            limit,
        }
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn expression(&self) -> &Arc<dyn Expression> {
        &self.expression
    }

    pub fn limit(&self) -> &Arc<dyn Expression> {
        &self.limit
    }
}

impl Constraint for MaximumConstraint {
    fn id(&self) -> &str {
        &self.id
    }

    fn granularity(&self) -> CheckGranularity {
        CheckGranularity::AtEachStop
    }

    fn expressions(&self) -> Vec<Arc<dyn Expression>> {
        vec![Arc::clone(&self.expression)]
    }

    fn estimate_is_violated(&self, solution: &Solution, mv: &MoveStops) -> (bool, PositionsHint) {
        let model = solution.model();
        let vehicle_type = model.vehicle_type(solution.vehicle_type_of_move(mv));

        let first_previous = mv.positions()[0].previous;
        let mut cumulative = solution.cumulative_value(&*self.expression, first_previous);
        let mut from = first_previous;
        for to in mv.chain_iter(solution) {
            let from_stop = model.stop(solution.model_stop(from));
            let to_stop = model.stop(solution.model_stop(to));
            cumulative += self.expression.value(vehicle_type, from_stop, to_stop);
            let limit = self.limit.value(vehicle_type, from_stop, to_stop);
            if cumulative > limit {
                return (true, PositionsHint::None);
            }
            from = to;
        }
        (false, PositionsHint::None)
    }

    fn is_stop_violated(&self, stop: SolutionStop<'_>) -> bool {
        let vehicle_type = stop
            .vehicle()
            .map(|vehicle| vehicle.vehicle_type())
            .expect("maximum constraint checked on an unplanned stop");
        let model_stop = stop.model_stop();
        let limit = self.limit.value(vehicle_type, model_stop, model_stop);
        stop.cumulative_value(&*self.expression) > limit
    }
}
