use crate::solver::moves::MoveStops;
use crate::solver::objectives::Objective;
use crate::solver::solution::Solution;

/// Minimizes the sum over vehicles of the route duration, the span between
/// the start of the first stop and the end of the last.
pub struct VehiclesDurationObjective {
    id: String,
}

impl VehiclesDurationObjective {
    pub fn new() -> Self {
        VehiclesDurationObjective {
            id: "vehicles_duration".to_owned(),
        }
    }
}

impl Default for VehiclesDurationObjective {
    fn default() -> Self {
        VehiclesDurationObjective::new()
    }
}

impl Objective for VehiclesDurationObjective {
    fn id(&self) -> &str {
        &self.id
    }

    fn estimate_delta_value(&self, solution: &Solution, mv: &MoveStops) -> f64 {
        let model = solution.model();
        let vehicle_slot = solution.vehicle_slot_of_move(mv);
        let vehicle_type = model.vehicle_type(solution.vehicle_type_of_move(mv));

        // Re-derive the end time of the route by walking the proposed chain
        // with the same temporal recurrence the evaluator uses.
        let first_previous = mv.positions()[0].previous;
        let last = solution.last_of_vehicle(vehicle_slot);

        let mut end = solution.end(first_previous);
        let mut from = first_previous;
        for to in mv.chain_iter(solution) {
            let from_stop = model.stop(solution.model_stop(from));
            let to_stop = model.stop(solution.model_stop(to));
            end = vehicle_type.temporal_values(end, from_stop, to_stop).end;
            from = to;
        }

        end - solution.end(last)
    }

    fn value(&self, solution: &Solution) -> f64 {
        (0..solution.number_of_vehicles())
            .map(|vehicle| {
                solution.end(solution.last_of_vehicle(vehicle))
                    - solution.start(solution.first_of_vehicle(vehicle))
            })
            .sum()
    }
}
