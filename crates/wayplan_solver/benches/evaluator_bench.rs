use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use criterion::{Criterion, criterion_group, criterion_main};
use jiff::Timestamp;

use wayplan_solver::model::expression::MatrixExpression;
use wayplan_solver::model::model::{Model, ModelBuilder};
use wayplan_solver::model::plan_unit::PlanUnitIdx;
use wayplan_solver::model::stop::StopBuilder;
use wayplan_solver::model::vehicle::{VehicleBuilder, VehicleTypeBuilder};
use wayplan_solver::solver::objectives::TravelDurationObjective;
use wayplan_solver::solver::solution::Solution;

const CUSTOMERS: usize = 50;

fn build_model() -> (Arc<Model>, Vec<PlanUnitIdx>) {
    let epoch: Timestamp = "2026-06-01T08:00:00Z".parse().unwrap();
    let mut builder = ModelBuilder::new(epoch);

    let mut add_stop = |builder: &mut ModelBuilder, id: String| {
        let mut stop = StopBuilder::default();
        stop.set_id(id);
        builder.add_stop(stop.build())
    };

    let start = add_stop(&mut builder, "depot-start".to_owned());
    let end = add_stop(&mut builder, "depot-end".to_owned());

    let mut units = Vec::with_capacity(CUSTOMERS);
    let mut stops = Vec::with_capacity(CUSTOMERS);
    for i in 0..CUSTOMERS {
        let stop = add_stop(&mut builder, format!("s{i}"));
        stops.push(stop);
        units.push(builder.add_plan_stops_unit(vec![stop]).unwrap());
    }

    // A ring of stops; travel is the index distance in minutes.
    let n = CUSTOMERS + 2;
    let mut travel = vec![vec![0.0; n]; n];
    for (from, row) in travel.iter_mut().enumerate() {
        for (to, seconds) in row.iter_mut().enumerate() {
            let gap = from.abs_diff(to) % CUSTOMERS;
            *seconds = 60.0 * gap.min(CUSTOMERS - gap) as f64;
        }
    }

    let mut vehicle_type = VehicleTypeBuilder::default();
    vehicle_type.set_id("truck");
    vehicle_type.set_travel_duration(Arc::new(MatrixExpression::new("travel", travel)));
    let vehicle_type = builder.add_vehicle_type(vehicle_type.build());

    for v in 0..4 {
        let mut vehicle = VehicleBuilder::default();
        vehicle.set_id(format!("v{v}"));
        vehicle.set_vehicle_type(vehicle_type);
        vehicle.set_start_time(epoch);
        vehicle.set_start_stop(start);
        vehicle.set_end_stop(end);
        builder.add_vehicle(vehicle.build()).unwrap();
    }

    builder.add_objective(Arc::new(TravelDurationObjective::new()), 1.0);
    (Arc::new(builder.build().unwrap()), units)
}

fn bench_best_move_and_execute(c: &mut Criterion) {
    let (model, units) = build_model();
    let cancelled = AtomicBool::new(false);

    c.bench_function("greedy_fill_50_stops_4_vehicles", |b| {
        b.iter(|| {
            let mut solution = Solution::new(Arc::clone(&model)).unwrap();
            for &unit in &units {
                let mv = solution.best_move(&cancelled, unit);
                mv.execute(&mut solution);
            }
            solution.score()
        })
    });

    c.bench_function("is_feasible_full_route", |b| {
        let mut solution = Solution::new(Arc::clone(&model)).unwrap();
        for &unit in &units {
            let mv = solution.best_move(&cancelled, unit);
            mv.execute(&mut solution);
        }
        let first = solution.first_of_vehicle(0);
        b.iter(|| solution.is_feasible(first, true).is_none())
    });
}

criterion_group!(benches, bench_best_move_and_execute);
criterion_main!(benches);
