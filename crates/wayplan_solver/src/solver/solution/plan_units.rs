use fxhash::FxHashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::model::plan_unit::{PlanUnit, PlanUnitIdx};
use crate::solver::moves::{MoveStops, StopPosition};
use crate::solver::solution::{Solution, SolutionError};

/// An ordered set of plan units with O(1) add/remove and uniform random
/// selection. Selection order depends only on the RNG state and the
/// collection's insertion history.
#[derive(Clone, Default)]
pub struct PlanUnitCollection {
    units: Vec<PlanUnitIdx>,
    positions: FxHashMap<PlanUnitIdx, usize>,
}

impl PlanUnitCollection {
    pub fn add(&mut self, unit: PlanUnitIdx) {
        if self.positions.contains_key(&unit) {
            return;
        }
        self.positions.insert(unit, self.units.len());
        self.units.push(unit);
    }

    pub fn remove(&mut self, unit: PlanUnitIdx) {
        let Some(position) = self.positions.remove(&unit) else {
            return;
        };
        self.units.swap_remove(position);
        if let Some(&moved) = self.units.get(position) {
            self.positions.insert(moved, position);
        }
    }

    pub fn contains(&self, unit: PlanUnitIdx) -> bool {
        self.positions.contains_key(&unit)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[PlanUnitIdx] {
        &self.units
    }
}

// The unplan scaffolding pool is process-wide; returned position buffers are
// cleared before reuse.
static UNPLAN_POSITIONS_POOL: Mutex<Vec<Vec<StopPosition>>> = Mutex::new(Vec::new());

fn unplan_pool_take() -> Vec<StopPosition> {
    UNPLAN_POSITIONS_POOL
        .lock()
        .pop()
        .unwrap_or_else(|| Vec::with_capacity(64))
}

fn unplan_pool_put(mut positions: Vec<StopPosition>) {
    positions.clear();
    UNPLAN_POSITIONS_POOL.lock().push(positions);
}

impl Solution {
    /// Plan units that must stay planned; disjoint from the other three
    /// collections.
    pub fn fixed_plan_units(&self) -> &[PlanUnitIdx] {
        self.fixed_units.units()
    }

    pub fn planned_plan_units(&self) -> &[PlanUnitIdx] {
        self.planned_units.units()
    }

    pub fn unplanned_plan_units(&self) -> &[PlanUnitIdx] {
        self.unplanned_units.units()
    }

    /// Members of a plan units unit; tracked inside their parent and not
    /// directly plannable.
    pub fn proposition_plan_units(&self) -> &[PlanUnitIdx] {
        self.proposition_units.units()
    }

    pub fn random_unplanned_plan_unit(&self) -> Option<PlanUnitIdx> {
        if self.unplanned_units.is_empty() {
            return None;
        }
        let pick = self.random_in_range(self.unplanned_units.len());
        Some(self.unplanned_units.units()[pick])
    }

    /// Whether a plan unit is currently planned. A stops unit is planned
    /// when every member stop is on a route; a one-of unit when exactly one
    /// child is; a conjunction when all children are.
    pub fn is_planned_unit(&self, unit: PlanUnitIdx) -> bool {
        match self.model().plan_unit(unit) {
            PlanUnit::Stops(_) => self
                .unit_slots(unit)
                .all(|slot| self.in_vehicle(slot).is_some()),
            PlanUnit::Units(units_unit) => {
                let planned = units_unit
                    .children()
                    .iter()
                    .filter(|&&child| self.is_planned_unit(child))
                    .count();
                if units_unit.plan_one_of() {
                    planned == 1
                } else {
                    planned == units_unit.children().len()
                }
            }
        }
    }

    /// True when any `plan_one_of` ancestor of the unit is already
    /// satisfied, which makes planning this unit not executable.
    pub(crate) fn has_planned_one_of_ancestor(&self, unit: PlanUnitIdx) -> bool {
        let model = self.model_arc();
        let mut current = model.plan_unit(unit).parent();
        while let Some(parent) = current {
            if let Some(units_unit) = model.plan_unit(parent).as_units() {
                if units_unit.plan_one_of() && self.is_planned_unit(parent) {
                    return true;
                }
            }
            current = model.plan_unit(parent).parent();
        }
        false
    }

    /// Moves the root of `unit` from the unplanned collection to planned
    /// (or fixed). Idempotent.
    pub(crate) fn mark_planned(&mut self, unit: PlanUnitIdx) {
        let root = self.model_arc().root_plan_unit(unit);
        if !self.unplanned_units.contains(root) {
            return;
        }
        self.unplanned_units.remove(root);
        if self.model().is_fixed(root) {
            self.fixed_units.add(root);
        } else {
            self.planned_units.add(root);
        }
    }

    /// Moves the root of `unit` back to the unplanned collection when it no
    /// longer is planned. Idempotent.
    pub(crate) fn mark_unplanned(&mut self, unit: PlanUnitIdx) {
        let root = self.model_arc().root_plan_unit(unit);
        if !self.planned_units.contains(root) || self.is_planned_unit(root) {
            return;
        }
        self.planned_units.remove(root);
        self.unplanned_units.add(root);
    }

    /// Unplans a planned, non-fixed plan stops unit: detaches its slots,
    /// re-verifies the route and moves the root to the unplanned
    /// collection. If the verification surfaces a violation the saved move
    /// is replayed to restore the previous state exactly; a failing replay
    /// is fatal.
    pub fn unplan(&mut self, unit: PlanUnitIdx) -> Result<bool, SolutionError> {
        let model = self.model_arc();
        if model.plan_unit(unit).as_stops().is_none() {
            return Ok(false);
        }
        if !self.is_planned_unit(unit) {
            return Ok(false);
        }
        let root = model.root_plan_unit(unit);
        if model.is_fixed(root) {
            return Ok(false);
        }

        debug!(unit = %unit, root = %root, "unplanning plan stops unit");

        self.planned_units.remove(root);
        self.unplanned_units.add(root);

        let mut positions = unplan_pool_take();
        let slots: Vec<usize> = self.unit_slots(unit).collect();
        for &slot in &slots {
            positions.push(StopPosition {
                previous: self.previous_slot(slot),
                stop: slot,
                next: self.next_slot(slot),
            });
        }

        let index = self.previous_slot(slots[0]);
        for &slot in &slots {
            self.detach(slot);
        }

        let result = if let Some(violation) = self.is_feasible(index, true) {
            // Detaching should only reduce constraint pressure; a violation
            // here means scratch-maintaining state went inconsistent.
            warn!(
                constraint = violation.constraint.id(),
                "unplan left the solution infeasible, replaying the saved move"
            );
            let mv = MoveStops::new(self, unit, positions.iter().copied());
            if !mv.execute(self) {
                Err(SolutionError::UnplanRestoreFailed)
            } else {
                Ok(false)
            }
        } else {
            debug!(unit = %unit, index, "unplan verified, route re-closed");
            Ok(true)
        };

        unplan_pool_put(positions);
        result
    }
}
