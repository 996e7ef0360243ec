use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use jiff::{SignedDuration, Timestamp};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{Level, trace};

use crate::model::expression::Expression;
use crate::model::model::Model;
use crate::model::plan_unit::PlanUnitIdx;
use crate::model::stop::StopIdx;
use crate::model::vehicle::{VehicleIdx, VehicleTypeIdx};
use crate::solver::constraints::{Constraint, PositionsHint, ScratchData};
use crate::solver::initial;
use crate::solver::moves::{MoveStops, StopPosition};
use crate::solver::solution::plan_units::PlanUnitCollection;
use crate::solver::solution::{SolutionError, SolutionStop, SolutionVehicle};

static NEXT_SOLUTION_ID: AtomicU64 = AtomicU64::new(0);

fn next_solution_id() -> u64 {
    NEXT_SOLUTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// The first constraint found violated by an evaluation pass, and the slot
/// it surfaced at.
pub struct ConstraintViolation {
    pub constraint: Arc<dyn Constraint>,
    pub index: usize,
}

/// A mutable snapshot of routes over the shared, frozen model.
///
/// Every stop slot lives in a set of dense parallel arrays indexed by a
/// solution-stop index. Routes are doubly-linked chains through `previous`
/// and `next`; an unplanned slot self-loops. Each vehicle contributes a
/// closed start/end slot pair.
///
/// A solution is owned by at most one search worker at a time. The RNG
/// mutex exists solely so `copy` can run concurrently against the same
/// source.
pub struct Solution {
    id: u64,
    model: Arc<Model>,

    stop: Vec<StopIdx>,
    in_vehicle: Vec<Option<usize>>,
    previous: Vec<usize>,
    next: Vec<usize>,
    stop_position: Vec<usize>,
    cumulative_travel_duration: Vec<f64>,
    arrival: Vec<f64>,
    start: Vec<f64>,
    end: Vec<f64>,
    slack: Vec<f64>,
    values: Vec<Vec<f64>>,
    cumulative_values: Vec<Vec<f64>>,

    constraint_stop_data: Vec<Vec<Option<Box<dyn ScratchData>>>>,
    objective_stop_data: Vec<Vec<Option<Box<dyn ScratchData>>>>,
    constraint_solution_data: Vec<Option<Box<dyn ScratchData>>>,
    objective_solution_data: Vec<Option<Box<dyn ScratchData>>>,

    scores: Vec<f64>,
    total_score: f64,

    first: Vec<usize>,
    last: Vec<usize>,
    vehicle_indices: Vec<VehicleIdx>,

    stop_to_plan_unit: Vec<Option<PlanUnitIdx>>,
    stop_to_slot: Vec<Option<usize>>,
    slot_ranges: Vec<Option<(usize, usize)>>,

    pub(crate) fixed_units: PlanUnitCollection,
    pub(crate) planned_units: PlanUnitCollection,
    pub(crate) unplanned_units: PlanUnitCollection,
    pub(crate) proposition_units: PlanUnitCollection,

    rng: Mutex<SmallRng>,
}

impl Solution {
    /// Builds an empty solution, wires every vehicle's start/end pair, then
    /// places the vehicles' seed routes. Locks the model; the first solution
    /// freezes it for good.
    pub fn new(model: Arc<Model>) -> Result<Solution, SolutionError> {
        model.lock();

        let plan_slots = model.number_of_plan_stop_slots();
        let total_slots = plan_slots + 2 * model.vehicles().len();
        let expression_rows = model
            .max_expression_index()
            .map(|index| index.get() + 1)
            .unwrap_or(0);

        let mut solution = Solution {
            id: next_solution_id(),
            model: Arc::clone(&model),
            stop: Vec::with_capacity(total_slots),
            in_vehicle: Vec::with_capacity(total_slots),
            previous: Vec::with_capacity(total_slots),
            next: Vec::with_capacity(total_slots),
            stop_position: Vec::with_capacity(total_slots),
            cumulative_travel_duration: Vec::with_capacity(total_slots),
            arrival: Vec::with_capacity(total_slots),
            start: Vec::with_capacity(total_slots),
            end: Vec::with_capacity(total_slots),
            slack: Vec::with_capacity(total_slots),
            values: vec![Vec::new(); expression_rows],
            cumulative_values: vec![Vec::new(); expression_rows],
            constraint_stop_data: vec![Vec::new(); model.constraints_with_stop_data().len()],
            objective_stop_data: vec![Vec::new(); model.objectives_with_stop_data().len()],
            constraint_solution_data: vec![None; model.constraints_with_solution_data().len()],
            objective_solution_data: vec![None; model.objectives_with_solution_data().len()],
            scores: vec![0.0; model.objective().terms().len()],
            total_score: 0.0,
            first: Vec::with_capacity(model.vehicles().len()),
            last: Vec::with_capacity(model.vehicles().len()),
            vehicle_indices: Vec::with_capacity(model.vehicles().len()),
            stop_to_plan_unit: Vec::with_capacity(total_slots),
            stop_to_slot: vec![None; model.stops().len()],
            slot_ranges: vec![None; model.plan_units().len()],
            fixed_units: PlanUnitCollection::default(),
            planned_units: PlanUnitCollection::default(),
            unplanned_units: PlanUnitCollection::default(),
            proposition_units: PlanUnitCollection::default(),
            rng: Mutex::new(SmallRng::seed_from_u64(model.next_seed())),
        };

        for unit in model.plan_units() {
            if let Some(stops_unit) = unit.as_stops() {
                let range_start = solution.stop.len();
                for &stop in stops_unit.stops() {
                    let slot = solution.stop.len();
                    solution.stop.push(stop);
                    solution.in_vehicle.push(None);
                    solution.previous.push(slot);
                    solution.next.push(slot);
                    solution.stop_position.push(0);
                    solution.cumulative_travel_duration.push(0.0);
                    solution.arrival.push(0.0);
                    solution.start.push(0.0);
                    solution.end.push(0.0);
                    solution.slack.push(f64::INFINITY);
                    solution.stop_to_plan_unit.push(Some(unit.index()));
                    solution.stop_to_slot[stop] = Some(slot);
                }
                solution.slot_ranges[unit.index()] =
                    Some((range_start, stops_unit.stops().len()));
            }
            if unit.parent().is_some() {
                solution.proposition_units.add(unit.index());
            } else {
                solution.unplanned_units.add(unit.index());
            }
        }

        for expression in model.expressions() {
            let row = expression.index().get();
            solution.values[row] = vec![0.0; plan_slots];
            solution.cumulative_values[row] = vec![0.0; plan_slots];
        }
        for row in &mut solution.constraint_stop_data {
            row.resize_with(plan_slots, || None);
        }
        for row in &mut solution.objective_stop_data {
            row.resize_with(plan_slots, || None);
        }

        for vehicle in model.vehicles() {
            solution.new_vehicle(vehicle.index())?;
        }

        initial::add_initial_solution(&mut solution)?;

        Ok(solution)
    }

    fn new_vehicle(&mut self, vehicle: VehicleIdx) -> Result<(), SolutionError> {
        let model = Arc::clone(&self.model);
        let model_vehicle = model.vehicle(vehicle);
        let start_seconds = model_vehicle
            .start_time()
            .duration_since(model.epoch())
            .as_secs_f64();

        let start_slot = self.stop.len();
        let end_slot = start_slot + 1;
        let vehicle_slot = self.first.len();

        self.stop.push(model_vehicle.start_stop());
        self.stop.push(model_vehicle.end_stop());
        self.in_vehicle.push(Some(vehicle_slot));
        self.in_vehicle.push(Some(vehicle_slot));
        self.previous.push(start_slot);
        self.previous.push(start_slot);
        self.next.push(end_slot);
        self.next.push(end_slot);
        self.stop_position.push(0);
        self.stop_position.push(1);
        self.cumulative_travel_duration.push(0.0);
        self.cumulative_travel_duration.push(0.0);
        self.arrival.push(start_seconds);
        self.arrival.push(0.0);
        self.start.push(start_seconds);
        self.start.push(0.0);
        self.end.push(start_seconds);
        self.end.push(0.0);
        self.slack.push(f64::INFINITY);
        self.slack.push(f64::INFINITY);
        self.stop_to_plan_unit.push(None);
        self.stop_to_plan_unit.push(None);

        let vehicle_type = model.vehicle_type(model_vehicle.vehicle_type());
        let first_stop = model.stop(model_vehicle.start_stop());
        for expression in model.expressions() {
            let row = expression.index().get();
            let value = expression.value(vehicle_type, first_stop, first_stop);
            self.values[row].push(value);
            self.values[row].push(0.0);
            self.cumulative_values[row].push(value);
            self.cumulative_values[row].push(value);
        }
        for row in &mut self.constraint_stop_data {
            row.push(None);
            row.push(None);
        }
        for row in &mut self.objective_stop_data {
            row.push(None);
            row.push(None);
        }

        self.first.push(start_slot);
        self.last.push(end_slot);
        self.vehicle_indices.push(vehicle);

        if let Some(violation) = self.is_feasible(start_slot, true) {
            return Err(SolutionError::EmptyVehicleInfeasible {
                vehicle: model_vehicle.id().to_owned(),
                constraint: violation.constraint.id().to_owned(),
            });
        }
        Ok(())
    }

    /// An independent deep copy sharing only the model. Every parallel array
    /// and every constraint/objective scratch is copied through its own
    /// deep-copy hook; the new RNG is seeded from the source's next draw.
    pub fn copy(&self) -> Solution {
        let seed = self.rng.lock().random();
        Solution {
            id: next_solution_id(),
            model: Arc::clone(&self.model),
            stop: self.stop.clone(),
            in_vehicle: self.in_vehicle.clone(),
            previous: self.previous.clone(),
            next: self.next.clone(),
            stop_position: self.stop_position.clone(),
            cumulative_travel_duration: self.cumulative_travel_duration.clone(),
            arrival: self.arrival.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            slack: self.slack.clone(),
            values: self.values.clone(),
            cumulative_values: self.cumulative_values.clone(),
            constraint_stop_data: self.constraint_stop_data.clone(),
            objective_stop_data: self.objective_stop_data.clone(),
            constraint_solution_data: self.constraint_solution_data.clone(),
            objective_solution_data: self.objective_solution_data.clone(),
            scores: self.scores.clone(),
            total_score: self.total_score,
            first: self.first.clone(),
            last: self.last.clone(),
            vehicle_indices: self.vehicle_indices.clone(),
            stop_to_plan_unit: self.stop_to_plan_unit.clone(),
            stop_to_slot: self.stop_to_slot.clone(),
            slot_ranges: self.slot_ranges.clone(),
            fixed_units: self.fixed_units.clone(),
            planned_units: self.planned_units.clone(),
            unplanned_units: self.unplanned_units.clone(),
            proposition_units: self.proposition_units.clone(),
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub(crate) fn model_arc(&self) -> Arc<Model> {
        Arc::clone(&self.model)
    }

    pub fn number_of_stop_slots(&self) -> usize {
        self.stop.len()
    }

    pub fn number_of_vehicles(&self) -> usize {
        self.first.len()
    }

    pub fn model_stop(&self, slot: usize) -> StopIdx {
        self.stop[slot]
    }

    pub fn in_vehicle(&self, slot: usize) -> Option<usize> {
        self.in_vehicle[slot]
    }

    pub fn previous_slot(&self, slot: usize) -> usize {
        self.previous[slot]
    }

    pub fn next_slot(&self, slot: usize) -> usize {
        self.next[slot]
    }

    pub fn stop_position(&self, slot: usize) -> usize {
        self.stop_position[slot]
    }

    pub fn arrival(&self, slot: usize) -> f64 {
        self.arrival[slot]
    }

    pub fn start(&self, slot: usize) -> f64 {
        self.start[slot]
    }

    pub fn end(&self, slot: usize) -> f64 {
        self.end[slot]
    }

    pub fn slack(&self, slot: usize) -> f64 {
        self.slack[slot]
    }

    pub fn cumulative_travel_duration(&self, slot: usize) -> f64 {
        self.cumulative_travel_duration[slot]
    }

    pub fn value(&self, expression: &dyn Expression, slot: usize) -> f64 {
        self.values[expression.index().get()][slot]
    }

    pub fn cumulative_value(&self, expression: &dyn Expression, slot: usize) -> f64 {
        self.cumulative_values[expression.index().get()][slot]
    }

    pub fn first_of_vehicle(&self, vehicle_slot: usize) -> usize {
        self.first[vehicle_slot]
    }

    pub fn last_of_vehicle(&self, vehicle_slot: usize) -> usize {
        self.last[vehicle_slot]
    }

    pub fn vehicle_of_slot(&self, vehicle_slot: usize) -> VehicleIdx {
        self.vehicle_indices[vehicle_slot]
    }

    /// The plan stops unit owning a slot; `None` for vehicle start/end slots.
    pub fn plan_unit_of_slot(&self, slot: usize) -> Option<PlanUnitIdx> {
        self.stop_to_plan_unit[slot]
    }

    /// The slot of a model stop that belongs to a plan unit.
    pub fn slot_of_model_stop(&self, stop: StopIdx) -> Option<usize> {
        self.stop_to_slot[stop]
    }

    pub(crate) fn unit_slots(&self, unit: PlanUnitIdx) -> std::ops::Range<usize> {
        let (start, len) = self.slot_ranges[unit]
            .expect("plan unit has no stop slots; it is not a plan stops unit");
        start..start + len
    }

    pub fn stop_view(&self, slot: usize) -> SolutionStop<'_> {
        SolutionStop::new(self, slot)
    }

    pub fn vehicle_view(&self, vehicle_slot: usize) -> SolutionVehicle<'_> {
        SolutionVehicle::new(self, vehicle_slot)
    }

    pub(crate) fn vehicle_slot_of_move(&self, mv: &MoveStops) -> usize {
        self.in_vehicle[mv.positions()[0].previous]
            .expect("move previous stop is not on a route")
    }

    pub(crate) fn vehicle_type_of_move(&self, mv: &MoveStops) -> VehicleTypeIdx {
        let vehicle_slot = self.vehicle_slot_of_move(mv);
        self.model
            .vehicle(self.vehicle_indices[vehicle_slot])
            .vehicle_type()
    }

    /// Converts seconds since the model epoch to an absolute time.
    pub fn time_at(&self, seconds: f64) -> Timestamp {
        self.model.epoch() + SignedDuration::from_secs_f64(seconds)
    }

    /// The composite objective score.
    pub fn score(&self) -> f64 {
        self.total_score
    }

    /// The score of one objective term, by registration order.
    pub fn objective_value(&self, term: usize) -> f64 {
        self.scores[term]
    }

    pub fn random_in_range(&self, upper: usize) -> usize {
        self.rng.lock().random_range(0..upper)
    }

    pub(crate) fn splice(&mut self, position: &StopPosition, vehicle: usize) {
        self.next[position.previous] = position.stop;
        self.previous[position.stop] = position.previous;
        self.next[position.stop] = position.next;
        self.previous[position.next] = position.stop;
        self.in_vehicle[position.stop] = Some(vehicle);
    }

    /// Splices a slot out of its chain and re-closes it; the slot returns to
    /// the unplanned self-loop state.
    pub(crate) fn detach(&mut self, slot: usize) {
        let previous = self.previous[slot];
        let next = self.next[slot];
        self.next[previous] = next;
        self.previous[next] = previous;
        self.previous[slot] = slot;
        self.next[slot] = slot;
        self.in_vehicle[slot] = None;
    }

    /// Cheap pre-check of a move against every constraint, then an
    /// edge-level objective delta estimate. Does not mutate solution state.
    pub fn estimate_move(&self, mv: &MoveStops) -> (f64, bool, PositionsHint) {
        for constraint in self.model.constraints() {
            let (violated, hint) = constraint.estimate_is_violated(self, mv);
            if violated {
                return (0.0, false, hint);
            }
        }
        let delta = self.model.objective().estimate_delta_value(self, mv);
        (delta, true, PositionsHint::None)
    }

    /// The incremental evaluator. Starting at `index`, walks the chain
    /// forward recomputing expression values, times and per-stop scratch,
    /// running each constraint's full check at its declared granularity.
    /// Returns the first violation, or `None` after refreshing slack and
    /// scores.
    ///
    /// With `include_temporal == false`, constraints declaring themselves
    /// temporal are skipped; the initial-solution loader uses this to admit
    /// routes before repairing time violations by removal.
    pub fn is_feasible(
        &mut self,
        index: usize,
        include_temporal: bool,
    ) -> Option<ConstraintViolation> {
        let model = Arc::clone(&self.model);
        let vehicle_slot =
            self.in_vehicle[index].expect("is_feasible requires an on-route start index");
        let vehicle_type_index = model.vehicle(self.vehicle_indices[vehicle_slot]).vehicle_type();
        let vehicle_type = model.vehicle_type(vehicle_type_index);

        // The per-stop trace stays behind one cached check; this loop runs
        // millions of times per search.
        let trace_enabled = tracing::enabled!(Level::TRACE);
        if trace_enabled {
            trace!(index, vehicle_slot, include_temporal, "evaluating route");
        }

        self.update_stop_scratch(&model, index);

        let mut index = index;
        while self.next[index] != index {
            let next = self.next[index];
            let from = model.stop(self.stop[index]);
            let to = model.stop(self.stop[next]);

            for expression in model.expressions() {
                let row = expression.index().get();
                let value = expression.value(vehicle_type, from, to);
                self.values[row][next] = value;
                self.cumulative_values[row][next] = self.cumulative_values[row][index] + value;
            }

            let temporal = vehicle_type.temporal_values(self.end[index], from, to);
            self.cumulative_travel_duration[next] =
                self.cumulative_travel_duration[index] + temporal.travel_duration;
            self.arrival[next] = temporal.arrival;
            self.start[next] = temporal.start;
            self.end[next] = temporal.end;
            self.stop_position[next] = self.stop_position[index] + 1;

            self.update_stop_scratch(&model, next);

            index = next;

            if trace_enabled {
                trace!(
                    slot = index,
                    arrival = self.arrival[index],
                    start = self.start[index],
                    end = self.end[index],
                    "recomputed stop"
                );
            }

            for &ci in model.constraints_at_each_stop() {
                let constraint = &model.constraints()[ci];
                if !include_temporal && constraint.is_temporal() {
                    continue;
                }
                if constraint.is_stop_violated(self.stop_view(index)) {
                    if trace_enabled {
                        trace!(
                            constraint = constraint.id(),
                            slot = index,
                            "stop violation"
                        );
                    }
                    return Some(ConstraintViolation {
                        constraint: Arc::clone(constraint),
                        index,
                    });
                }
            }
            if self.next[index] == index {
                for &ci in model.constraints_at_each_vehicle() {
                    let constraint = &model.constraints()[ci];
                    if !include_temporal && constraint.is_temporal() {
                        continue;
                    }
                    if constraint.is_vehicle_violated(self.vehicle_view(vehicle_slot)) {
                        return Some(ConstraintViolation {
                            constraint: Arc::clone(constraint),
                            index,
                        });
                    }
                }
            }
        }

        for &ci in model.constraints_at_each_solution() {
            let constraint = &model.constraints()[ci];
            if !include_temporal && constraint.is_temporal() {
                continue;
            }
            if constraint.is_solution_violated(self) {
                return Some(ConstraintViolation {
                    constraint: Arc::clone(constraint),
                    index,
                });
            }
        }

        for (di, &ci) in model.constraints_with_solution_data().iter().enumerate() {
            let data = model.constraints()[ci].update_solution_data(self);
            self.constraint_solution_data[di] = data;
        }
        for (di, &ti) in model.objectives_with_solution_data().iter().enumerate() {
            let data = model.objective().terms()[ti]
                .objective()
                .update_solution_data(self);
            self.objective_solution_data[di] = data;
        }

        // Waiting slack accumulates on the backward pass: the slack at a
        // stop is the total wait from that stop to the route's end.
        let mut slack = 0.0;
        let mut back = index;
        while self.previous[back] != back {
            slack += self.start[back] - self.arrival[back];
            self.slack[back] = slack;
            back = self.previous[back];
        }
        if trace_enabled {
            trace!(route_end = index, total_slack = slack, "backward pass done");
        }

        let mut total = 0.0;
        for (ti, term) in model.objective().terms().iter().enumerate() {
            let score = term.objective().value(self) * term.factor();
            self.scores[ti] = score;
            total += score;
        }
        self.total_score = total;

        None
    }

    fn update_stop_scratch(&mut self, model: &Model, slot: usize) {
        for (di, &ci) in model.constraints_with_stop_data().iter().enumerate() {
            let data = model.constraints()[ci].update_stop_data(self.stop_view(slot));
            self.constraint_stop_data[di][slot] = data;
        }
        for (di, &ti) in model.objectives_with_stop_data().iter().enumerate() {
            let data = model.objective().terms()[ti]
                .objective()
                .update_stop_data(self.stop_view(slot));
            self.objective_stop_data[di][slot] = data;
        }
    }

    /// Per-stop scratch of the `nth` constraint in the model's
    /// with-stop-data partition.
    pub fn constraint_stop_data(&self, nth: usize, slot: usize) -> Option<&dyn ScratchData> {
        self.constraint_stop_data[nth][slot].as_deref()
    }

    pub fn constraint_solution_data(&self, nth: usize) -> Option<&dyn ScratchData> {
        self.constraint_solution_data[nth].as_deref()
    }

    pub fn objective_stop_data(&self, nth: usize, slot: usize) -> Option<&dyn ScratchData> {
        self.objective_stop_data[nth][slot].as_deref()
    }

    pub fn objective_solution_data(&self, nth: usize) -> Option<&dyn ScratchData> {
        self.objective_solution_data[nth].as_deref()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::model::model::ModelBuilder;
    use crate::model::plan_unit::PlanUnitIdx;
    use crate::solver::constraints::{CheckGranularity, Constraint, PositionsHint};
    use crate::solver::moves::MoveStops;
    use crate::solver::objectives::TravelDurationObjective;
    use crate::test_utils::{
        add_matrix_vehicle, assert_route_invariants, epoch, snapshot, stop,
        two_customer_travel_seconds,
    };

    struct TwoCustomerModel {
        model: Arc<Model>,
        p1: PlanUnitIdx,
        p2: PlanUnitIdx,
    }

    fn two_customer_model(factor: f64) -> TwoCustomerModel {
        let mut builder = ModelBuilder::new(epoch());
        let start = builder.add_stop(stop("depot-start"));
        let end = builder.add_stop(stop("depot-end"));
        let s1 = builder.add_stop(stop("s1"));
        let s2 = builder.add_stop(stop("s2"));
        let p1 = builder.add_plan_stops_unit(vec![s1]).unwrap();
        let p2 = builder.add_plan_stops_unit(vec![s2]).unwrap();
        add_matrix_vehicle(
            &mut builder,
            two_customer_travel_seconds(),
            start,
            end,
            vec![],
        );
        builder.add_objective(Arc::new(TravelDurationObjective::new()), factor);
        TwoCustomerModel {
            model: Arc::new(builder.build().unwrap()),
            p1,
            p2,
        }
    }

    #[test]
    fn test_new_solution_wires_vehicle_pairs() {
        let fixture = two_customer_model(1.0);
        let solution = Solution::new(Arc::clone(&fixture.model)).unwrap();

        assert_eq!(solution.number_of_stop_slots(), 4);
        assert_eq!(solution.number_of_vehicles(), 1);

        let first = solution.first_of_vehicle(0);
        let last = solution.last_of_vehicle(0);
        assert_eq!(solution.next_slot(first), last);
        assert_eq!(solution.previous_slot(last), first);
        assert_eq!(solution.previous_slot(first), first);
        assert_eq!(solution.next_slot(last), last);
        assert_eq!(solution.stop_position(first), 0);
        assert_eq!(solution.stop_position(last), 1);
        assert_eq!(solution.arrival(first), 0.0);
        assert_eq!(solution.start(first), 0.0);
        assert_eq!(solution.end(first), 0.0);

        // Plan-unit slots start out as unplanned self-loops.
        for unit in [fixture.p1, fixture.p2] {
            for slot in solution.unit_slots(unit) {
                assert_eq!(solution.previous_slot(slot), slot);
                assert_eq!(solution.next_slot(slot), slot);
                assert_eq!(solution.in_vehicle(slot), None);
                assert_eq!(solution.slack(slot), f64::INFINITY);
            }
        }
        assert_route_invariants(&solution);
    }

    #[test]
    fn test_insert_two_units_travel_duration_and_score() {
        let fixture = two_customer_model(1.5);
        let mut solution = Solution::new(Arc::clone(&fixture.model)).unwrap();
        let cancelled = AtomicBool::new(false);

        let move_1 = solution.best_move(&cancelled, fixture.p1);
        assert!(move_1.is_executable());
        assert!(move_1.execute(&mut solution));

        let score_before = solution.score();
        let move_2 = solution.best_move(&cancelled, fixture.p2);
        assert!(move_2.is_executable());
        let estimated = move_2.value();
        assert!(move_2.execute(&mut solution));

        let last = solution.last_of_vehicle(0);
        assert_eq!(solution.cumulative_travel_duration(last), 30.0);
        assert_eq!(solution.score(), 30.0 * 1.5);

        // Move estimation soundness: the executed delta matches the score
        // difference.
        let diff = solution.score() - score_before;
        assert!((diff - estimated).abs() <= 1e-9 * solution.score().abs());

        assert_route_invariants(&solution);
        assert!(solution.planned_plan_units().contains(&fixture.p1));
        assert!(solution.planned_plan_units().contains(&fixture.p2));
        assert!(solution.unplanned_plan_units().is_empty());
    }

    #[test]
    fn test_is_feasible_is_deterministic_and_idempotent() {
        let fixture = two_customer_model(1.0);
        let mut solution = Solution::new(Arc::clone(&fixture.model)).unwrap();
        let cancelled = AtomicBool::new(false);

        let mv = solution.best_move(&cancelled, fixture.p1);
        assert!(mv.execute(&mut solution));

        let first = solution.first_of_vehicle(0);
        assert!(solution.is_feasible(first, true).is_none());
        let before = snapshot(&solution);
        assert!(solution.is_feasible(first, true).is_none());
        assert_eq!(snapshot(&solution), before);
    }

    #[test]
    fn test_copy_is_independent() {
        let fixture = two_customer_model(1.0);
        let mut solution = Solution::new(Arc::clone(&fixture.model)).unwrap();
        let cancelled = AtomicBool::new(false);

        let mv = solution.best_move(&cancelled, fixture.p1);
        assert!(mv.execute(&mut solution));

        let copied = solution.copy();
        assert_ne!(copied.id(), solution.id());
        assert_eq!(snapshot(&copied), snapshot(&solution));
        let score_before = solution.score();

        let mv = solution.best_move(&cancelled, fixture.p2);
        assert!(mv.execute(&mut solution));

        assert_eq!(copied.score(), score_before);
        assert_ne!(snapshot(&copied), snapshot(&solution));
        assert!(copied.unplanned_plan_units().contains(&fixture.p2));
        assert_route_invariants(&copied);
    }

    #[derive(Clone)]
    struct VisitOrder(usize);

    impl ScratchData for VisitOrder {
        fn clone_box(&self) -> Box<dyn ScratchData> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct VisitOrderConstraint;

    impl Constraint for VisitOrderConstraint {
        fn id(&self) -> &str {
            "visit_order"
        }

        fn granularity(&self) -> CheckGranularity {
            CheckGranularity::AtEachStop
        }

        fn estimate_is_violated(
            &self,
            _solution: &Solution,
            _mv: &MoveStops,
        ) -> (bool, PositionsHint) {
            (false, PositionsHint::None)
        }

        fn has_stop_data(&self) -> bool {
            true
        }

        fn update_stop_data(&self, stop: SolutionStop<'_>) -> Option<Box<dyn ScratchData>> {
            Some(Box::new(VisitOrder(stop.position())))
        }
    }

    #[test]
    fn test_scratch_data_is_deep_copied() {
        let mut builder = ModelBuilder::new(epoch());
        let start = builder.add_stop(stop("depot-start"));
        let end = builder.add_stop(stop("depot-end"));
        let s1 = builder.add_stop(stop("s1"));
        let s2 = builder.add_stop(stop("s2"));
        let p1 = builder.add_plan_stops_unit(vec![s1]).unwrap();
        builder.add_plan_stops_unit(vec![s2]).unwrap();
        add_matrix_vehicle(
            &mut builder,
            two_customer_travel_seconds(),
            start,
            end,
            vec![],
        );
        builder.add_constraint(Arc::new(VisitOrderConstraint));
        let model = Arc::new(builder.build().unwrap());

        let mut solution = Solution::new(Arc::clone(&model)).unwrap();
        let cancelled = AtomicBool::new(false);
        let mv = solution.best_move(&cancelled, p1);
        assert!(mv.execute(&mut solution));

        // One scratch entry per stop slot.
        for slot in 0..solution.number_of_stop_slots() {
            let _ = solution.constraint_stop_data(0, slot);
        }

        let slot = solution.unit_slots(p1).next().unwrap();
        let order = |s: &Solution, slot: usize| {
            s.constraint_stop_data(0, slot)
                .and_then(|data| data.as_any().downcast_ref::<VisitOrder>())
                .map(|data| data.0)
        };
        assert_eq!(order(&solution, slot), Some(1));

        let copied = solution.copy();
        assert_eq!(order(&copied, slot), Some(1));

        solution.unplan(p1).unwrap();
        // The copy keeps its own scratch; the source was re-evaluated.
        assert_eq!(order(&copied, slot), Some(1));
    }

    #[test]
    fn test_earliest_start_produces_waiting_slack() {
        use crate::model::expression::{MatrixExpression, StopTimeExpression};
        use crate::model::vehicle::{VehicleBuilder, VehicleTypeBuilder};
        use jiff::SignedDuration;

        let mut builder = ModelBuilder::new(epoch());
        let start = builder.add_stop(stop("depot-start"));
        let end = builder.add_stop(stop("depot-end"));
        let s1 = builder.add_stop(stop("s1"));
        let _s2 = builder.add_stop(stop("s2"));
        let p1 = builder.add_plan_stops_unit(vec![s1]).unwrap();

        // s1 does not open until 100 seconds after the epoch.
        let mut opens = StopTimeExpression::new("opens", epoch(), epoch());
        opens.set_time(s1, epoch() + SignedDuration::from_secs(100));

        let mut vehicle_type = VehicleTypeBuilder::default();
        vehicle_type.set_id("truck");
        vehicle_type.set_travel_duration(Arc::new(MatrixExpression::new(
            "travel-seconds",
            two_customer_travel_seconds(),
        )));
        vehicle_type.set_earliest_start(Arc::new(opens));
        let vehicle_type = builder.add_vehicle_type(vehicle_type.build());

        let mut vehicle = VehicleBuilder::default();
        vehicle.set_id("v0");
        vehicle.set_vehicle_type(vehicle_type);
        vehicle.set_start_time(epoch());
        vehicle.set_start_stop(start);
        vehicle.set_end_stop(end);
        builder.add_vehicle(vehicle.build()).unwrap();

        let model = Arc::new(builder.build().unwrap());
        let mut solution = Solution::new(Arc::clone(&model)).unwrap();
        let cancelled = AtomicBool::new(false);
        assert!(solution.best_move(&cancelled, p1).execute(&mut solution));

        let slot = solution.unit_slots(p1).next().unwrap();
        assert_eq!(solution.arrival(slot), 10.0);
        assert_eq!(solution.start(slot), 100.0);
        assert_eq!(solution.end(slot), 100.0);
        assert_eq!(solution.stop_view(slot).waiting_duration(), 90.0);

        // Slack accumulates on the backward pass from the route end.
        let last = solution.last_of_vehicle(0);
        assert_eq!(solution.arrival(last), 110.0);
        assert_eq!(solution.slack(last), 0.0);
        assert_eq!(solution.slack(slot), 90.0);
    }
}
