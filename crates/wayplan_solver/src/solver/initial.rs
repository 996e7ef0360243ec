use fxhash::FxHashSet;
use tracing::{Level, debug, instrument};

use crate::model::model::Model;
use crate::model::plan_unit::PlanUnitIdx;
use crate::model::vehicle::Vehicle;
use crate::solver::constraints::Constraint;
use crate::solver::moves::{MoveStops, StopPosition};
use crate::solver::solution::{Solution, SolutionError};

fn infeasible_initial_solution(
    model: &Model,
    vehicle: &Vehicle,
    constraint: &dyn Constraint,
    mv: &MoveStops,
    solution: &Solution,
) -> SolutionError {
    let stops = mv
        .positions()
        .iter()
        .map(|position| {
            model
                .stop(solution.model_stop(position.stop))
                .id()
                .to_owned()
        })
        .collect::<Vec<_>>()
        .join(", ");
    SolutionError::InfeasibleInitialSolution {
        vehicle: vehicle.id().to_owned(),
        constraint: constraint.id().to_owned(),
        stops,
    }
}

/// Places the user-supplied seed routes one vehicle at a time. Non-temporal
/// feasibility gates admission; temporal violations are repaired afterwards
/// by removing non-fixed plan units, walking backward from the reported
/// stop. Infeasibility of a fixed plan unit fails the whole build.
#[instrument(skip_all, level = Level::DEBUG)]
pub(crate) fn add_initial_solution(solution: &mut Solution) -> Result<(), SolutionError> {
    let model = solution.model_arc();

    for vehicle_slot in 0..solution.number_of_vehicles() {
        let model_vehicle = model.vehicle(solution.vehicle_of_slot(vehicle_slot));
        let initial_stops = model_vehicle.initial_stops();
        if initial_stops.is_empty() {
            continue;
        }
        debug!(
            vehicle = model_vehicle.id(),
            stops = initial_stops.len(),
            "placing seed route"
        );

        // Distinct plan stops units in first-occurrence order.
        let mut units: Vec<PlanUnitIdx> = Vec::new();
        for &stop in initial_stops {
            if let Some(unit) = model.stop(stop).plan_unit() {
                if !units.contains(&unit) {
                    units.push(unit);
                }
            }
        }

        let first = solution.first_of_vehicle(vehicle_slot);
        let last = solution.last_of_vehicle(vehicle_slot);

        let mut infeasible: FxHashSet<PlanUnitIdx> = FxHashSet::default();
        let mut all_roots: Vec<PlanUnitIdx> = Vec::new();

        'unit_loop: for &unit in &units {
            let root = model.root_plan_unit(unit);
            if !all_roots.contains(&root) {
                all_roots.push(root);
            }

            if let Some(parent) = model.plan_unit(unit).parent() {
                if let Some(units_unit) = model.plan_unit(parent).as_units() {
                    if units_unit.plan_one_of() && solution.is_planned_unit(parent) {
                        let unit_stop = model.plan_unit(unit).as_stops().unwrap().stops()[0];
                        return Err(SolutionError::OneOfAlreadyPlanned {
                            stop: model.stop(unit_stop).id().to_owned(),
                            vehicle: model_vehicle.id().to_owned(),
                        });
                    }
                }
            }

            // One stop position per unit stop, chained in declared order,
            // interleaved with whatever the seed already planned.
            let unit_stop_count = solution.unit_slots(unit).len();
            let mut positions: Vec<StopPosition> = Vec::with_capacity(unit_stop_count);
            let mut previous = first;
            for (seed_idx, &model_stop) in initial_stops.iter().enumerate() {
                if positions.len() == unit_stop_count {
                    break;
                }
                let Some(slot) = solution.slot_of_model_stop(model_stop) else {
                    continue;
                };
                if solution.in_vehicle(slot).is_some() {
                    previous = slot;
                }
                if model.stop(model_stop).plan_unit() == Some(unit) {
                    let mut next_slot = last;
                    for &later_stop in &initial_stops[seed_idx + 1..] {
                        let Some(candidate) = solution.slot_of_model_stop(later_stop) else {
                            continue;
                        };
                        if solution.in_vehicle(candidate).is_some()
                            || model.stop(later_stop).plan_unit() == Some(unit)
                        {
                            next_slot = candidate;
                            break;
                        }
                    }
                    positions.push(StopPosition {
                        previous,
                        stop: slot,
                        next: next_slot,
                    });
                    previous = slot;
                }
            }

            let mv = MoveStops::new(solution, unit, positions);

            // Temporal-blind first pass over the cheap checks.
            for constraint in model.constraints() {
                if constraint.is_temporal() {
                    continue;
                }
                let (violated, _hint) = constraint.estimate_is_violated(solution, &mv);
                if violated {
                    if model.is_fixed(root) {
                        return Err(infeasible_initial_solution(
                            &model,
                            model_vehicle,
                            &**constraint,
                            &mv,
                            solution,
                        ));
                    }
                    infeasible.insert(root);
                    continue 'unit_loop;
                }
            }

            let index = mv.attach(solution);
            if let Some(violation) = solution.is_feasible(index, false) {
                if model.is_fixed(root) {
                    return Err(infeasible_initial_solution(
                        &model,
                        model_vehicle,
                        &*violation.constraint,
                        &mv,
                        solution,
                    ));
                }
                for position in mv.positions() {
                    solution.detach(position.stop);
                }
                infeasible.insert(root);
            }
        }

        // Temporal repair: while a violation remains, walk backward from the
        // reported stop over the end slot and fixed plan units to the first
        // removable one, and detach its whole root plan unit.
        loop {
            let Some(violation) = solution.is_feasible(first, true) else {
                break;
            };
            let mut index = violation.index;
            if index == first {
                return Err(SolutionError::InfeasibleAtVehicleStart {
                    vehicle: model_vehicle.id().to_owned(),
                    constraint: violation.constraint.id().to_owned(),
                });
            }
            loop {
                let removable = index != last
                    && solution
                        .plan_unit_of_slot(index)
                        .is_some_and(|unit| !model.is_fixed(model.root_plan_unit(unit)));
                if removable {
                    break;
                }
                index = solution.previous_slot(index);
                if index == first {
                    return Err(SolutionError::NoRemovableStop {
                        vehicle: model_vehicle.id().to_owned(),
                        constraint: violation.constraint.id().to_owned(),
                    });
                }
            }

            let unit = solution.plan_unit_of_slot(index).unwrap();
            let root = model.root_plan_unit(unit);
            debug!(
                vehicle = model_vehicle.id(),
                constraint = violation.constraint.id(),
                "removing plan unit to repair a temporal violation"
            );
            for stops_unit in model.plan_stops_descendants(root) {
                if solution.is_planned_unit(stops_unit) {
                    let slots: Vec<usize> = solution.unit_slots(stops_unit).collect();
                    for slot in slots {
                        solution.detach(slot);
                    }
                }
            }
            infeasible.insert(root);
        }

        for &root in &all_roots {
            if infeasible.contains(&root) {
                continue;
            }
            solution.mark_planned(root);
        }

        // Brings scratch data and scores back to a consistent state.
        let _residual = solution.is_feasible(first, true);
        debug_assert!(_residual.is_none(), "seed route infeasible after repair");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::model::expression::{MatrixExpression, VehicleTypeValueExpression};
    use crate::model::model::ModelBuilder;
    use crate::model::stop::StopIdx;
    use crate::solver::constraints::{
        CheckGranularity, Constraint, MaximumConstraint, PositionsHint,
    };
    use crate::solver::moves::MoveStops;
    use crate::solver::objectives::TravelDurationObjective;
    use crate::solver::solution::{Solution, SolutionError, SolutionStop};
    use crate::test_utils::{
        add_matrix_vehicle, assert_route_invariants, epoch, fixed_stop, stop,
        two_customer_distance_meters, two_customer_travel_seconds,
    };

    /// Every stop must start its service before a route-wide deadline.
    struct LatestStartConstraint {
        latest: f64,
    }

    impl Constraint for LatestStartConstraint {
        fn id(&self) -> &str {
            "latest_start"
        }

        fn granularity(&self) -> CheckGranularity {
            CheckGranularity::AtEachStop
        }

        fn is_temporal(&self) -> bool {
            true
        }

        fn estimate_is_violated(
            &self,
            _solution: &Solution,
            _mv: &MoveStops,
        ) -> (bool, PositionsHint) {
            (false, PositionsHint::None)
        }

        fn is_stop_violated(&self, stop: SolutionStop<'_>) -> bool {
            stop.start() > self.latest
        }
    }

    struct SeedFixture {
        builder: ModelBuilder,
        start: StopIdx,
        end: StopIdx,
        s1: StopIdx,
        s2: StopIdx,
    }

    fn seed_fixture(fixed_first: bool, fixed_second: bool) -> SeedFixture {
        let mut builder = ModelBuilder::new(epoch());
        let start = builder.add_stop(stop("depot-start"));
        let end = builder.add_stop(stop("depot-end"));
        let s1 = builder.add_stop(if fixed_first {
            fixed_stop("s1")
        } else {
            stop("s1")
        });
        let s2 = builder.add_stop(if fixed_second {
            fixed_stop("s2")
        } else {
            stop("s2")
        });
        SeedFixture {
            builder,
            start,
            end,
            s1,
            s2,
        }
    }

    #[test]
    fn test_seed_route_preserves_order() {
        let mut fixture = seed_fixture(false, false);
        let p1 = fixture.builder.add_plan_stops_unit(vec![fixture.s1]).unwrap();
        let p2 = fixture.builder.add_plan_stops_unit(vec![fixture.s2]).unwrap();
        add_matrix_vehicle(
            &mut fixture.builder,
            two_customer_travel_seconds(),
            fixture.start,
            fixture.end,
            vec![fixture.s2, fixture.s1],
        );
        fixture
            .builder
            .add_objective(Arc::new(TravelDurationObjective::new()), 1.0);
        let model = Arc::new(fixture.builder.build().unwrap());

        let solution = Solution::new(Arc::clone(&model)).unwrap();
        let route: Vec<StopIdx> = solution
            .vehicle_view(0)
            .stops()
            .map(|stop| stop.model_stop().index())
            .collect();
        assert_eq!(
            route,
            vec![fixture.start, fixture.s2, fixture.s1, fixture.end]
        );
        assert!(solution.planned_plan_units().contains(&p1));
        assert!(solution.planned_plan_units().contains(&p2));
        assert_route_invariants(&solution);
    }

    #[test]
    fn test_temporal_violation_drops_non_fixed_unit() {
        let mut fixture = seed_fixture(true, false);
        let p1 = fixture.builder.add_plan_stops_unit(vec![fixture.s1]).unwrap();
        let p2 = fixture.builder.add_plan_stops_unit(vec![fixture.s2]).unwrap();
        add_matrix_vehicle(
            &mut fixture.builder,
            two_customer_travel_seconds(),
            fixture.start,
            fixture.end,
            vec![fixture.s1, fixture.s2],
        );
        // depot -> s1 -> depot ends at 20; adding s2 pushes the route end to
        // 30, past the deadline.
        fixture
            .builder
            .add_constraint(Arc::new(LatestStartConstraint { latest: 25.0 }));
        fixture
            .builder
            .add_objective(Arc::new(TravelDurationObjective::new()), 1.0);
        let model = Arc::new(fixture.builder.build().unwrap());

        let mut solution = Solution::new(Arc::clone(&model)).unwrap();
        assert!(solution.fixed_plan_units().contains(&p1));
        assert!(solution.unplanned_plan_units().contains(&p2));

        let first = solution.first_of_vehicle(0);
        assert!(solution.is_feasible(first, true).is_none());
        assert_route_invariants(&solution);
    }

    #[test]
    fn test_temporal_violation_with_only_fixed_units_fails() {
        let mut fixture = seed_fixture(true, true);
        fixture.builder.add_plan_stops_unit(vec![fixture.s1]).unwrap();
        fixture.builder.add_plan_stops_unit(vec![fixture.s2]).unwrap();
        add_matrix_vehicle(
            &mut fixture.builder,
            two_customer_travel_seconds(),
            fixture.start,
            fixture.end,
            vec![fixture.s1, fixture.s2],
        );
        fixture
            .builder
            .add_constraint(Arc::new(LatestStartConstraint { latest: 25.0 }));
        let model = Arc::new(fixture.builder.build().unwrap());

        let error = Solution::new(Arc::clone(&model))
            .err()
            .expect("the build must fail");
        match error {
            SolutionError::NoRemovableStop { vehicle, .. } => assert_eq!(vehicle, "v0"),
            other => panic!("expected NoRemovableStop, got {other}"),
        }
    }

    #[test]
    fn test_non_temporal_violation_of_fixed_unit_fails() {
        let mut fixture = seed_fixture(true, false);
        fixture.builder.add_plan_stops_unit(vec![fixture.s1]).unwrap();
        fixture.builder.add_plan_stops_unit(vec![fixture.s2]).unwrap();
        add_matrix_vehicle(
            &mut fixture.builder,
            two_customer_travel_seconds(),
            fixture.start,
            fixture.end,
            vec![fixture.s1],
        );
        // depot -> s1 -> depot is 200 meters; the limit of 150 violates the
        // fixed seed unit outright.
        let distance = Arc::new(MatrixExpression::new(
            "distance-meters",
            two_customer_distance_meters(),
        ));
        fixture.builder.add_constraint(Arc::new(MaximumConstraint::new(
            distance,
            Arc::new(VehicleTypeValueExpression::new("distance-limit", 150.0)),
        )));
        let model = Arc::new(fixture.builder.build().unwrap());

        let error = Solution::new(Arc::clone(&model))
            .err()
            .expect("the build must fail");
        match error {
            SolutionError::InfeasibleInitialSolution { stops, .. } => assert_eq!(stops, "s1"),
            other => panic!("expected InfeasibleInitialSolution, got {other}"),
        }
    }

    #[test]
    fn test_seeding_two_members_of_a_one_of_unit_fails() {
        let mut fixture = seed_fixture(false, false);
        let p1 = fixture.builder.add_plan_stops_unit(vec![fixture.s1]).unwrap();
        let p2 = fixture.builder.add_plan_stops_unit(vec![fixture.s2]).unwrap();
        fixture.builder.add_plan_units_unit(vec![p1, p2], true).unwrap();
        add_matrix_vehicle(
            &mut fixture.builder,
            two_customer_travel_seconds(),
            fixture.start,
            fixture.end,
            vec![fixture.s1, fixture.s2],
        );
        let model = Arc::new(fixture.builder.build().unwrap());

        let error = Solution::new(Arc::clone(&model))
            .err()
            .expect("the build must fail");
        match error {
            SolutionError::OneOfAlreadyPlanned { stop, .. } => assert_eq!(stop, "s2"),
            other => panic!("expected OneOfAlreadyPlanned, got {other}"),
        }
    }
}
