use crate::model::vehicle::{Vehicle, VehicleType};
use crate::solver::solution::{Solution, SolutionStop};

/// A non-owning view of one vehicle's route.
#[derive(Clone, Copy)]
pub struct SolutionVehicle<'a> {
    solution: &'a Solution,
    index: usize,
}

impl<'a> SolutionVehicle<'a> {
    pub(crate) fn new(solution: &'a Solution, index: usize) -> Self {
        SolutionVehicle { solution, index }
    }

    /// The vehicle slot number within the solution.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn model_vehicle(&self) -> &'a Vehicle {
        self.solution
            .model()
            .vehicle(self.solution.vehicle_of_slot(self.index))
    }

    pub fn vehicle_type(&self) -> &'a VehicleType {
        self.solution
            .model()
            .vehicle_type(self.model_vehicle().vehicle_type())
    }

    pub fn first(&self) -> SolutionStop<'a> {
        SolutionStop::new(self.solution, self.solution.first_of_vehicle(self.index))
    }

    pub fn last(&self) -> SolutionStop<'a> {
        SolutionStop::new(self.solution, self.solution.last_of_vehicle(self.index))
    }

    /// Stops from the route start to the route end, in order.
    pub fn stops(&self) -> RouteIter<'a> {
        RouteIter {
            solution: self.solution,
            current: Some(self.solution.first_of_vehicle(self.index)),
        }
    }

    /// Planned stops excluding the start and end slots.
    pub fn number_of_stops(&self) -> usize {
        self.solution
            .stop_position(self.solution.last_of_vehicle(self.index))
            .saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.number_of_stops() == 0
    }

    /// Route duration in seconds: end of the last stop minus start of the
    /// first.
    pub fn duration(&self) -> f64 {
        self.last().end() - self.first().start()
    }
}

pub struct RouteIter<'a> {
    solution: &'a Solution,
    current: Option<usize>,
}

impl<'a> Iterator for RouteIter<'a> {
    type Item = SolutionStop<'a>;

    fn next(&mut self) -> Option<SolutionStop<'a>> {
        let current = self.current?;
        let next = self.solution.next_slot(current);
        self.current = if next == current { None } else { Some(next) };
        Some(SolutionStop::new(self.solution, current))
    }
}
