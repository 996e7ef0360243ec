use std::sync::Arc;

use jiff::Timestamp;

use crate::model::expression::MatrixExpression;
use crate::model::location::Location;
use crate::model::model::ModelBuilder;
use crate::model::stop::{Stop, StopBuilder, StopIdx};
use crate::model::vehicle::{VehicleBuilder, VehicleIdx, VehicleTypeBuilder, VehicleTypeIdx};
use crate::solver::solution::Solution;

pub(crate) type SlotSnapshot = (usize, usize, Option<usize>, usize, [f64; 5], Vec<(f64, f64)>);

/// Captures every per-slot parallel array, expression rows included, for
/// bitwise before/after comparisons.
pub(crate) fn snapshot(solution: &Solution) -> Vec<SlotSnapshot> {
    (0..solution.number_of_stop_slots())
        .map(|slot| {
            (
                solution.previous_slot(slot),
                solution.next_slot(slot),
                solution.in_vehicle(slot),
                solution.stop_position(slot),
                [
                    solution.arrival(slot),
                    solution.start(slot),
                    solution.end(slot),
                    solution.slack(slot),
                    solution.cumulative_travel_duration(slot),
                ],
                solution
                    .model()
                    .expressions()
                    .iter()
                    .map(|expression| {
                        (
                            solution.value(&**expression, slot),
                            solution.cumulative_value(&**expression, slot),
                        )
                    })
                    .collect(),
            )
        })
        .collect()
}

/// Checks the chain, position and monotonicity invariants plus the
/// plan-unit partition.
pub(crate) fn assert_route_invariants(solution: &Solution) {
    for slot in 0..solution.number_of_stop_slots() {
        let previous = solution.previous_slot(slot);
        let next = solution.next_slot(slot);
        if next != slot {
            assert_eq!(solution.previous_slot(next), slot);
        }
        if previous != slot {
            assert_eq!(solution.next_slot(previous), slot);
        }
        if solution.in_vehicle(slot).is_none() {
            assert_eq!(previous, slot);
            assert_eq!(next, slot);
        }
    }

    for vehicle in 0..solution.number_of_vehicles() {
        let mut position = 0;
        let mut slot = solution.first_of_vehicle(vehicle);
        let mut cumulative = solution.cumulative_travel_duration(slot);
        loop {
            assert_eq!(solution.stop_position(slot), position);
            assert!(solution.cumulative_travel_duration(slot) >= cumulative);
            cumulative = solution.cumulative_travel_duration(slot);
            assert_eq!(solution.in_vehicle(slot), Some(vehicle));
            let next = solution.next_slot(slot);
            if next == slot {
                break;
            }
            slot = next;
            position += 1;
            assert!(position <= solution.number_of_stop_slots());
        }
        assert_eq!(slot, solution.last_of_vehicle(vehicle));
    }

    let mut seen = 0;
    for units in [
        solution.fixed_plan_units(),
        solution.planned_plan_units(),
        solution.unplanned_plan_units(),
        solution.proposition_plan_units(),
    ] {
        seen += units.len();
    }
    assert_eq!(seen, solution.model().plan_units().len());
}

pub(crate) fn epoch() -> Timestamp {
    "2026-06-01T08:00:00Z".parse().unwrap()
}

pub(crate) fn stop(id: &str) -> Stop {
    let mut builder = StopBuilder::default();
    builder.set_id(id);
    builder.build()
}

pub(crate) fn located_stop(id: &str, lon: f64, lat: f64) -> Stop {
    let mut builder = StopBuilder::default();
    builder.set_id(id);
    builder.set_location(Location::from_lat_lon(lat, lon));
    builder.build()
}

pub(crate) fn fixed_stop(id: &str) -> Stop {
    let mut builder = StopBuilder::default();
    builder.set_id(id);
    builder.set_fixed(true);
    builder.build()
}

/// Travel seconds for the two-customer, single-depot fixture: stop indices
/// 0/1 are the depot start/end pair, 2 and 3 the customers. 300 meters of
/// route at 10 m/s over depot -> s1 -> s2 -> depot.
pub(crate) fn two_customer_travel_seconds() -> Vec<Vec<f64>> {
    let mut matrix = vec![vec![0.0; 4]; 4];
    for depot in [0, 1] {
        matrix[depot][2] = 10.0;
        matrix[2][depot] = 10.0;
        matrix[depot][3] = 15.0;
        matrix[3][depot] = 15.0;
    }
    matrix[2][3] = 5.0;
    matrix[3][2] = 5.0;
    matrix
}

/// The same legs in meters.
pub(crate) fn two_customer_distance_meters() -> Vec<Vec<f64>> {
    two_customer_travel_seconds()
        .into_iter()
        .map(|row| row.into_iter().map(|seconds| seconds * 10.0).collect())
        .collect()
}

/// Adds a vehicle type driven by the given travel-seconds matrix plus one
/// vehicle starting at the model epoch, with an optional seed route.
pub(crate) fn add_matrix_vehicle(
    builder: &mut ModelBuilder,
    travel_seconds: Vec<Vec<f64>>,
    start: StopIdx,
    end: StopIdx,
    initial_stops: Vec<StopIdx>,
) -> (VehicleTypeIdx, VehicleIdx) {
    let mut vehicle_type = VehicleTypeBuilder::default();
    vehicle_type.set_id("truck");
    vehicle_type.set_travel_duration(Arc::new(MatrixExpression::new(
        "travel-seconds",
        travel_seconds,
    )));
    let vehicle_type = builder.add_vehicle_type(vehicle_type.build());

    let mut vehicle = VehicleBuilder::default();
    vehicle.set_id("v0");
    vehicle.set_vehicle_type(vehicle_type);
    vehicle.set_start_time(builder.epoch());
    vehicle.set_start_stop(start);
    vehicle.set_end_stop(end);
    vehicle.set_initial_stops(initial_stops);
    let vehicle = builder.add_vehicle(vehicle.build()).unwrap();

    (vehicle_type, vehicle)
}
