use smallvec::SmallVec;

use crate::model::plan_unit::PlanUnitIdx;
use crate::solver::solution::Solution;

/// An oriented insertion of one stop slot between two others. Chaining the
/// positions of a move yields a simple sub-chain on the target vehicle: each
/// `next` either already sits after `previous` in the route, or is itself a
/// later insertion of the same move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPosition {
    pub previous: usize,
    pub stop: usize,
    pub next: usize,
}

/// A proposed insertion of a plan stops unit at specific positions in one
/// route. Short-lived: attachments are reversible until a feasibility check
/// succeeds. The move remembers which solution spawned it; using it against
/// another solution is a bug, not input.
#[derive(Debug, Clone)]
pub struct MoveStops {
    solution_id: u64,
    plan_unit: PlanUnitIdx,
    positions: SmallVec<[StopPosition; 2]>,
    value: f64,
    allowed: bool,
}

impl MoveStops {
    pub fn new(
        solution: &Solution,
        plan_unit: PlanUnitIdx,
        positions: impl IntoIterator<Item = StopPosition>,
    ) -> Self {
        MoveStops {
            solution_id: solution.id(),
            plan_unit,
            positions: positions.into_iter().collect(),
            value: 0.0,
            allowed: true,
        }
    }

    /// The "no feasible insertion found" sentinel; compares as worse than
    /// any feasible move.
    pub fn not_executable(solution: &Solution, plan_unit: PlanUnitIdx) -> Self {
        MoveStops {
            solution_id: solution.id(),
            plan_unit,
            positions: SmallVec::new(),
            value: 0.0,
            allowed: false,
        }
    }

    pub fn plan_unit(&self) -> PlanUnitIdx {
        self.plan_unit
    }

    pub fn positions(&self) -> &[StopPosition] {
        &self.positions
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_executable(&self) -> bool {
        self.allowed
    }

    pub(crate) fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub(crate) fn clear_positions(&mut self) {
        self.positions.clear();
    }

    pub(crate) fn push_position(&mut self, position: StopPosition) {
        self.positions.push(position);
    }

    /// Walks the route as it would look with this move attached, yielding
    /// slots strictly after `positions[0].previous` up to and including the
    /// vehicle's last slot. Does not mutate the solution.
    pub fn chain_iter<'a>(&'a self, solution: &'a Solution) -> ChainIter<'a> {
        ChainIter {
            solution,
            positions: &self.positions,
            current: self.positions[0].previous,
            done: false,
        }
    }

    /// Splices every position into the linked chain, in order. Returns the
    /// earliest affected index; callers must follow up with
    /// `is_feasible(earliest, ..)` and detach on violation.
    pub(crate) fn attach(&self, solution: &mut Solution) -> usize {
        let vehicle = solution
            .in_vehicle(self.positions[0].previous)
            .expect("move attach requires a planned previous stop");
        for position in &self.positions {
            solution.splice(position, vehicle);
        }
        self.positions[0].previous
    }

    /// Attach, verify, and on success update plan-unit membership. On any
    /// violation the solution is restored bitwise and `false` is returned.
    pub fn execute(&self, solution: &mut Solution) -> bool {
        assert_eq!(
            self.solution_id,
            solution.id(),
            "move executed on a solution it does not belong to"
        );
        if !self.allowed {
            return false;
        }

        let index = self.attach(solution);
        if solution.is_feasible(index, true).is_some() {
            for position in &self.positions {
                solution.detach(position.stop);
            }
            let _restored = solution.is_feasible(index, true);
            debug_assert!(
                _restored.is_none(),
                "solution infeasible after undoing a rejected move"
            );
            return false;
        }

        solution.mark_planned(self.plan_unit);
        true
    }

    /// Reverts a successful `execute`.
    pub(crate) fn undo(&self, solution: &mut Solution) {
        let index = self.positions[0].previous;
        for position in &self.positions {
            solution.detach(position.stop);
        }
        let _restored = solution.is_feasible(index, true);
        debug_assert!(
            _restored.is_none(),
            "solution infeasible after undoing an executed move"
        );
        solution.mark_unplanned(self.plan_unit);
    }
}

pub struct ChainIter<'a> {
    solution: &'a Solution,
    positions: &'a [StopPosition],
    current: usize,
    done: bool,
}

impl Iterator for ChainIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.done {
            return None;
        }
        // An insertion after the current slot takes precedence over the
        // existing chain; an inserted slot continues at its declared next.
        let next = if let Some(position) = self
            .positions
            .iter()
            .find(|position| position.previous == self.current)
        {
            position.stop
        } else if let Some(position) = self
            .positions
            .iter()
            .find(|position| position.stop == self.current)
        {
            position.next
        } else {
            let next = self.solution.next_slot(self.current);
            if next == self.current {
                self.done = true;
                return None;
            }
            next
        };
        self.current = next;
        Some(next)
    }
}
