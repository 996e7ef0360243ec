use jiff::Timestamp;

use crate::model::expression::Expression;
use crate::model::stop::Stop;
use crate::solver::solution::{Solution, SolutionVehicle};

/// A non-owning view of one stop slot: a `(solution, index)` pair created on
/// demand. The solution owns all arrays.
#[derive(Clone, Copy)]
pub struct SolutionStop<'a> {
    solution: &'a Solution,
    index: usize,
}

impl<'a> SolutionStop<'a> {
    pub(crate) fn new(solution: &'a Solution, index: usize) -> Self {
        SolutionStop { solution, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn solution(&self) -> &'a Solution {
        self.solution
    }

    pub fn model_stop(&self) -> &'a Stop {
        self.solution.model().stop(self.solution.model_stop(self.index))
    }

    pub fn is_planned(&self) -> bool {
        self.solution.in_vehicle(self.index).is_some()
    }

    pub fn is_first(&self) -> bool {
        self.solution.previous_slot(self.index) == self.index && self.is_planned()
    }

    pub fn is_last(&self) -> bool {
        self.solution.next_slot(self.index) == self.index && self.is_planned()
    }

    pub fn previous(&self) -> SolutionStop<'a> {
        SolutionStop::new(self.solution, self.solution.previous_slot(self.index))
    }

    pub fn next(&self) -> SolutionStop<'a> {
        SolutionStop::new(self.solution, self.solution.next_slot(self.index))
    }

    pub fn vehicle(&self) -> Option<SolutionVehicle<'a>> {
        self.solution
            .in_vehicle(self.index)
            .map(|vehicle_slot| SolutionVehicle::new(self.solution, vehicle_slot))
    }

    pub fn position(&self) -> usize {
        self.solution.stop_position(self.index)
    }

    /// Seconds since the model epoch.
    pub fn arrival(&self) -> f64 {
        self.solution.arrival(self.index)
    }

    pub fn start(&self) -> f64 {
        self.solution.start(self.index)
    }

    pub fn end(&self) -> f64 {
        self.solution.end(self.index)
    }

    pub fn slack(&self) -> f64 {
        self.solution.slack(self.index)
    }

    pub fn cumulative_travel_duration(&self) -> f64 {
        self.solution.cumulative_travel_duration(self.index)
    }

    /// Travel spent on the edge into this stop.
    pub fn travel_duration(&self) -> f64 {
        self.cumulative_travel_duration()
            - self
                .solution
                .cumulative_travel_duration(self.solution.previous_slot(self.index))
    }

    pub fn waiting_duration(&self) -> f64 {
        self.start() - self.arrival()
    }

    pub fn arrival_time(&self) -> Timestamp {
        self.solution.time_at(self.arrival())
    }

    pub fn start_time(&self) -> Timestamp {
        self.solution.time_at(self.start())
    }

    pub fn end_time(&self) -> Timestamp {
        self.solution.time_at(self.end())
    }

    pub fn value(&self, expression: &dyn Expression) -> f64 {
        self.solution.value(expression, self.index)
    }

    pub fn cumulative_value(&self, expression: &dyn Expression) -> f64 {
        self.solution.cumulative_value(expression, self.index)
    }
}
