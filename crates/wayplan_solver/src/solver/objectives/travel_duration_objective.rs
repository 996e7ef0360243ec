use crate::solver::moves::MoveStops;
use crate::solver::objectives::Objective;
use crate::solver::solution::Solution;

/// Minimizes the sum over vehicles of the cumulative travel duration at the
/// vehicle's last stop.
pub struct TravelDurationObjective {
    id: String,
}

impl TravelDurationObjective {
    pub fn new() -> Self {
        TravelDurationObjective {
            id: "travel_duration".to_owned(),
        }
    }
}

impl Default for TravelDurationObjective {
    fn default() -> Self {
        TravelDurationObjective::new()
    }
}

impl Objective for TravelDurationObjective {
    fn id(&self) -> &str {
        &self.id
    }

    fn estimate_delta_value(&self, solution: &Solution, mv: &MoveStops) -> f64 {
        let model = solution.model();
        let vehicle_slot = solution.vehicle_slot_of_move(mv);
        let vehicle_type = model.vehicle_type(solution.vehicle_type_of_move(mv));
        let travel_duration = vehicle_type.travel_duration();

        let first_previous = mv.positions()[0].previous;
        let last = solution.last_of_vehicle(vehicle_slot);

        let mut new_tail = 0.0;
        let mut from = first_previous;
        for to in mv.chain_iter(solution) {
            let from_stop = model.stop(solution.model_stop(from));
            let to_stop = model.stop(solution.model_stop(to));
            new_tail += travel_duration.value(vehicle_type, from_stop, to_stop);
            from = to;
        }

        let old_tail = solution.cumulative_travel_duration(last)
            - solution.cumulative_travel_duration(first_previous);
        new_tail - old_tail
    }

    fn value(&self, solution: &Solution) -> f64 {
        (0..solution.number_of_vehicles())
            .map(|vehicle| {
                solution.cumulative_travel_duration(solution.last_of_vehicle(vehicle))
            })
            .sum()
    }
}
