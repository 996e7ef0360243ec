use jiff::Timestamp;
use serde::Serialize;

use crate::model::plan_unit::{PlanUnit, PlanUnitIdx};
use crate::solver::solution::{Solution, SolutionStop};

/// Per-vehicle route sequence, unplanned list and objective breakdown, in
/// the shape the surrounding formatter consumes.
#[derive(Debug, Clone, Serialize)]
pub struct SolutionOutput {
    pub vehicles: Vec<VehicleOutput>,
    pub unplanned: Vec<UnplannedStopOutput>,
    pub objective: ObjectiveOutput,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnplannedStopOutput {
    pub id: String,
    pub lon: Option<f64>,
    pub lat: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedStopOutput {
    pub id: String,
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    pub arrival_time: Timestamp,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub travel_duration: i64,
    pub cumulative_travel_duration: i64,
    pub waiting_duration: i64,
    pub duration: i64,
    pub travel_distance: f64,
    pub cumulative_travel_distance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleOutput {
    pub id: String,
    pub route: Vec<PlannedStopOutput>,
    pub route_duration: i64,
    pub route_travel_duration: i64,
    pub route_stops_duration: i64,
    pub route_waiting_duration: i64,
    pub route_travel_distance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectiveTermOutput {
    pub name: String,
    pub factor: f64,
    pub base: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectiveOutput {
    pub name: String,
    pub objectives: Vec<ObjectiveTermOutput>,
    pub value: f64,
}

impl SolutionOutput {
    pub fn from_solution(solution: &Solution) -> SolutionOutput {
        let vehicles = (0..solution.number_of_vehicles())
            .map(|vehicle_slot| {
                let vehicle = solution.vehicle_view(vehicle_slot);
                let route: Vec<PlannedStopOutput> = vehicle
                    .stops()
                    .filter(|stop| stop.model_stop().location().is_some())
                    .map(|stop| planned_stop_output(solution, stop))
                    .collect();

                let route_travel_distance =
                    route.iter().map(|stop| stop.travel_distance).sum::<f64>();
                let route_stops_duration = route.iter().map(|stop| stop.duration).sum::<i64>();
                let route_duration = vehicle.duration().round() as i64;
                let route_travel_duration =
                    vehicle.last().cumulative_travel_duration().round() as i64;

                let mut cumulative_distance = 0.0;
                let mut route = route;
                for stop in &mut route {
                    cumulative_distance += stop.travel_distance;
                    stop.cumulative_travel_distance = cumulative_distance;
                }

                VehicleOutput {
                    id: vehicle.model_vehicle().id().to_owned(),
                    route,
                    route_duration,
                    route_travel_duration,
                    route_stops_duration,
                    route_waiting_duration: route_duration
                        - route_travel_duration
                        - route_stops_duration,
                    route_travel_distance,
                }
            })
            .collect();

        let mut unplanned = Vec::new();
        for &unit in solution.unplanned_plan_units() {
            collect_unplanned(solution, unit, &mut unplanned);
        }
        unplanned.sort_by(|a, b| a.id.cmp(&b.id));

        SolutionOutput {
            vehicles,
            unplanned,
            objective: objective_output(solution),
        }
    }
}

fn planned_stop_output(solution: &Solution, stop: SolutionStop<'_>) -> PlannedStopOutput {
    let model = solution.model();
    let model_stop = stop.model_stop();

    let travel_distance = match model.distance_expression() {
        Some(distance) if !stop.is_first() => {
            let vehicle_type = stop
                .vehicle()
                .map(|vehicle| vehicle.vehicle_type())
                .expect("output requires planned stops");
            distance.value(vehicle_type, stop.previous().model_stop(), model_stop)
        }
        _ => 0.0,
    };

    PlannedStopOutput {
        id: model_stop.id().to_owned(),
        lon: model_stop.location().map(|location| location.lon()),
        lat: model_stop.location().map(|location| location.lat()),
        arrival_time: stop.arrival_time(),
        start_time: stop.start_time(),
        end_time: stop.end_time(),
        travel_duration: stop.travel_duration().round() as i64,
        cumulative_travel_duration: stop.cumulative_travel_duration().round() as i64,
        waiting_duration: stop.waiting_duration().round() as i64,
        duration: (stop.end() - stop.start()).round() as i64,
        travel_distance,
        cumulative_travel_distance: 0.0,
    }
}

fn collect_unplanned(
    solution: &Solution,
    unit: PlanUnitIdx,
    output: &mut Vec<UnplannedStopOutput>,
) {
    match solution.model().plan_unit(unit) {
        PlanUnit::Stops(stops_unit) => {
            for &stop in stops_unit.stops() {
                let model_stop = solution.model().stop(stop);
                output.push(UnplannedStopOutput {
                    id: model_stop.id().to_owned(),
                    lon: model_stop.location().map(|location| location.lon()),
                    lat: model_stop.location().map(|location| location.lat()),
                });
            }
        }
        PlanUnit::Units(units_unit) => {
            // A one-of unit has no single set of stops to report.
            if !units_unit.plan_one_of() {
                for &child in units_unit.children() {
                    collect_unplanned(solution, child, output);
                }
            }
        }
    }
}

fn objective_output(solution: &Solution) -> ObjectiveOutput {
    let objectives = solution
        .model()
        .objective()
        .terms()
        .iter()
        .enumerate()
        .map(|(ti, term)| {
            let value = solution.objective_value(ti);
            ObjectiveTermOutput {
                name: term.objective().id().to_owned(),
                factor: term.factor(),
                base: if term.factor() != 0.0 {
                    value / term.factor()
                } else {
                    0.0
                },
                value,
            }
        })
        .collect();

    ObjectiveOutput {
        name: "weighted_sum".to_owned(),
        objectives,
        value: solution.score(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::model::expression::MatrixExpression;
    use crate::model::model::ModelBuilder;
    use crate::solver::objectives::TravelDurationObjective;
    use crate::test_utils::{
        add_matrix_vehicle, epoch, located_stop, two_customer_distance_meters,
        two_customer_travel_seconds,
    };

    #[test]
    fn test_route_output_totals() {
        let mut builder = ModelBuilder::new(epoch());
        let start = builder.add_stop(located_stop("depot-start", 4.9, 52.4));
        let end = builder.add_stop(located_stop("depot-end", 4.9, 52.4));
        let s1 = builder.add_stop(located_stop("s1", 4.91, 52.4));
        let s2 = builder.add_stop(located_stop("s2", 4.92, 52.4));
        let s3 = builder.add_stop(located_stop("s3", 4.93, 52.4));
        let p1 = builder.add_plan_stops_unit(vec![s1]).unwrap();
        let p2 = builder.add_plan_stops_unit(vec![s2]).unwrap();
        builder.add_plan_stops_unit(vec![s3]).unwrap();

        let mut travel = two_customer_travel_seconds();
        let mut distance = two_customer_distance_meters();
        for row in travel.iter_mut().chain(distance.iter_mut()) {
            row.push(0.0);
        }
        travel.push(vec![0.0; 5]);
        distance.push(vec![0.0; 5]);

        add_matrix_vehicle(&mut builder, travel, start, end, vec![]);
        builder.set_distance_expression(Arc::new(MatrixExpression::new(
            "distance-meters",
            distance,
        )));
        builder.add_objective(Arc::new(TravelDurationObjective::new()), 1.5);
        let model = Arc::new(builder.build().unwrap());

        let mut solution = Solution::new(Arc::clone(&model)).unwrap();
        let cancelled = AtomicBool::new(false);
        assert!(solution.best_move(&cancelled, p1).execute(&mut solution));
        assert!(solution.best_move(&cancelled, p2).execute(&mut solution));

        let output = SolutionOutput::from_solution(&solution);

        assert_eq!(output.vehicles.len(), 1);
        let vehicle = &output.vehicles[0];
        assert_eq!(vehicle.id, "v0");
        assert_eq!(vehicle.route.len(), 4);
        assert_eq!(vehicle.route_travel_duration, 30);
        assert_eq!(vehicle.route_duration, 30);
        assert_eq!(vehicle.route_travel_distance, 300.0);
        assert_eq!(vehicle.route[3].cumulative_travel_distance, 300.0);
        assert_eq!(vehicle.route[3].cumulative_travel_duration, 30);

        // Unplanned stops are stably sorted by id.
        assert_eq!(output.unplanned.len(), 1);
        assert_eq!(output.unplanned[0].id, "s3");

        assert_eq!(output.objective.value, 45.0);
        assert_eq!(output.objective.objectives.len(), 1);
        assert_eq!(output.objective.objectives[0].name, "travel_duration");
        assert_eq!(output.objective.objectives[0].factor, 1.5);
        assert_eq!(output.objective.objectives[0].base, 30.0);
        assert_eq!(output.objective.objectives[0].value, 45.0);
    }
}
