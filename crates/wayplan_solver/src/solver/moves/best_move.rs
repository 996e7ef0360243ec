use std::sync::atomic::{AtomicBool, Ordering};

use crate::model::plan_unit::{PlanUnit, PlanUnitIdx};
use crate::solver::constraints::PositionsHint;
use crate::solver::moves::{Move, MoveStops, MoveUnits, StopPosition, take_best_in_place};
use crate::solver::solution::Solution;

impl Solution {
    /// The best feasible insertion of a plan unit across all vehicles, or a
    /// not-executable sentinel. Vehicles are visited in slot order;
    /// candidate positions per vehicle in lexicographic order, so exact
    /// score ties resolve to the lowest vehicle and earliest positions.
    ///
    /// Cancellation is observed at vehicle boundaries: the best move found
    /// so far is returned, never an error. The search itself does not
    /// mutate the solution; only executing the returned move does.
    pub fn best_move(&self, cancelled: &AtomicBool, plan_unit: PlanUnitIdx) -> Move {
        if self.is_planned_unit(plan_unit) || self.has_planned_one_of_ancestor(plan_unit) {
            return self.not_executable_move(plan_unit);
        }
        self.best_move_for_unit(cancelled, plan_unit)
    }

    fn not_executable_move(&self, plan_unit: PlanUnitIdx) -> Move {
        match self.model().plan_unit(plan_unit) {
            PlanUnit::Stops(_) => Move::Stops(MoveStops::not_executable(self, plan_unit)),
            PlanUnit::Units(_) => Move::Units(MoveUnits::not_executable(self, plan_unit)),
        }
    }

    fn best_move_for_unit(&self, cancelled: &AtomicBool, plan_unit: PlanUnitIdx) -> Move {
        let model = self.model_arc();
        match model.plan_unit(plan_unit) {
            PlanUnit::Stops(_) => {
                let mut best = Move::Stops(MoveStops::not_executable(self, plan_unit));
                for vehicle_slot in 0..self.number_of_vehicles() {
                    if cancelled.load(Ordering::Relaxed) {
                        return best;
                    }
                    self.best_move_on_vehicle(vehicle_slot, plan_unit, &mut best);
                }
                best
            }
            PlanUnit::Units(units_unit) => {
                if units_unit.plan_one_of() {
                    let mut best_child =
                        Move::Stops(MoveStops::not_executable(self, plan_unit));
                    for &child in units_unit.children() {
                        if cancelled.load(Ordering::Relaxed) {
                            break;
                        }
                        let child_move = self.best_move_for_unit(cancelled, child);
                        take_best_in_place(&mut best_child, child_move);
                    }
                    if !best_child.is_executable() {
                        return Move::Units(MoveUnits::not_executable(self, plan_unit));
                    }
                    Move::Units(MoveUnits::new(self, plan_unit, vec![best_child]))
                } else {
                    // Conjunction: every child needs a move. Child moves are
                    // estimated against the current solution; execute applies
                    // them sequentially and undoes all on failure.
                    let mut moves = Vec::with_capacity(units_unit.children().len());
                    for &child in units_unit.children() {
                        let child_move = self.best_move_for_unit(cancelled, child);
                        if !child_move.is_executable() {
                            return Move::Units(MoveUnits::not_executable(self, plan_unit));
                        }
                        moves.push(child_move);
                    }
                    Move::Units(MoveUnits::new(self, plan_unit, moves))
                }
            }
        }
    }

    /// Exhaustively enumerates the ways to interleave the unit's stops, in
    /// declared order, into one vehicle's route, folding each candidate with
    /// the move comparator. A `SkipVehicle` or `SkipPlanUnit` hint prunes
    /// the remaining positions on this vehicle.
    fn best_move_on_vehicle(&self, vehicle_slot: usize, plan_unit: PlanUnitIdx, best: &mut Move) {
        let unit_slots: Vec<usize> = self.unit_slots(plan_unit).collect();
        let stop_count = unit_slots.len();

        let last = self.last_of_vehicle(vehicle_slot);
        let mut route = Vec::with_capacity(self.stop_position(last) + 1);
        let mut slot = self.first_of_vehicle(vehicle_slot);
        loop {
            route.push(slot);
            let next = self.next_slot(slot);
            if next == slot {
                break;
            }
            slot = next;
        }
        let gaps = route.len() - 1;

        // Reusable candidate; the common singleton unit allocates nothing
        // per position tuple.
        let mut candidate = MoveStops::new(self, plan_unit, std::iter::empty());
        let mut assignment = vec![0usize; stop_count];

        'enumeration: loop {
            candidate.clear_positions();
            for i in 0..stop_count {
                let gap = assignment[i];
                let previous = if i > 0 && assignment[i - 1] == gap {
                    unit_slots[i - 1]
                } else {
                    route[gap]
                };
                let next = if i + 1 < stop_count && assignment[i + 1] == gap {
                    unit_slots[i + 1]
                } else {
                    route[gap + 1]
                };
                candidate.push_position(StopPosition {
                    previous,
                    stop: unit_slots[i],
                    next,
                });
            }

            let (delta, feasible, hint) = self.estimate_move(&candidate);
            if feasible {
                candidate.set_value(delta);
                if !best.is_executable() || delta < best.value() {
                    *best = Move::Stops(candidate.clone());
                }
            } else if matches!(
                hint,
                PositionsHint::SkipVehicle | PositionsHint::SkipPlanUnit
            ) {
                return;
            }

            // Next non-decreasing gap tuple in lexicographic order.
            let mut i = stop_count;
            loop {
                if i == 0 {
                    break 'enumeration;
                }
                i -= 1;
                if assignment[i] + 1 < gaps {
                    let bumped = assignment[i] + 1;
                    for value in assignment[i..].iter_mut() {
                        *value = bumped;
                    }
                    continue 'enumeration;
                }
            }
        }
    }
}
