use std::sync::Arc;
use std::sync::OnceLock;

use fxhash::FxHashSet;
use jiff::Timestamp;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::model::expression::{Expression, ExpressionIdx};
use crate::model::plan_unit::{PlanUnit, PlanUnitIdx};
use crate::model::stop::{Stop, StopIdx};
use crate::model::vehicle::{Vehicle, VehicleIdx, VehicleType, VehicleTypeIdx};
use crate::solver::constraints::Constraint;
use crate::solver::objectives::{Objective, ObjectiveSum, ObjectiveTerm};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("stop `{stop}` is used in more than one plan unit")]
    DuplicateStopInPlanUnit { stop: String },
    #[error("a plan stops unit requires at least one stop")]
    EmptyPlanUnit,
    #[error("stop `{stop}` is a vehicle start or end stop and cannot be part of a plan unit")]
    VehicleStopInPlanUnit { stop: String },
    #[error("plan unit {unit} is already a member of another plan units unit")]
    AlreadyNested { unit: PlanUnitIdx },
    #[error("a plan units unit requires at least one member")]
    EmptyPlanUnitsUnit,
    #[error("vehicle `{vehicle}` references stop `{stop}` which belongs to a plan unit")]
    PlanStopAsVehicleStop { vehicle: String, stop: String },
}

/// The immutable problem definition. Built once through [`ModelBuilder`],
/// locked at first solution creation; locking is one-way and runs every
/// constraint's lock hook exactly once.
pub struct Model {
    epoch: Timestamp,
    stops: Vec<Stop>,
    vehicle_types: Vec<VehicleType>,
    vehicles: Vec<Vehicle>,
    plan_units: Vec<PlanUnit>,
    expressions: Vec<Arc<dyn Expression>>,
    constraints: Vec<Arc<dyn Constraint>>,
    objective: ObjectiveSum,
    distance_expression: Option<Arc<dyn Expression>>,

    // Capability partitions, fixed at build so the evaluator's hot loop
    // never re-probes (indices into `constraints` / the objective's terms).
    constraints_at_each_stop: Vec<usize>,
    constraints_at_each_vehicle: Vec<usize>,
    constraints_at_each_solution: Vec<usize>,
    constraints_with_stop_data: Vec<usize>,
    constraints_with_solution_data: Vec<usize>,
    objectives_with_stop_data: Vec<usize>,
    objectives_with_solution_data: Vec<usize>,

    rng: Mutex<SmallRng>,
    locked: OnceLock<()>,
}

impl Model {
    pub fn epoch(&self) -> Timestamp {
        self.epoch
    }

    pub fn stop(&self, index: StopIdx) -> &Stop {
        &self.stops[index]
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn vehicle(&self, index: VehicleIdx) -> &Vehicle {
        &self.vehicles[index]
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn vehicle_type(&self, index: VehicleTypeIdx) -> &VehicleType {
        &self.vehicle_types[index]
    }

    pub fn vehicle_types(&self) -> &[VehicleType] {
        &self.vehicle_types
    }

    pub fn plan_unit(&self, index: PlanUnitIdx) -> &PlanUnit {
        &self.plan_units[index]
    }

    pub fn plan_units(&self) -> &[PlanUnit] {
        &self.plan_units
    }

    pub fn expressions(&self) -> &[Arc<dyn Expression>] {
        &self.expressions
    }

    pub fn constraints(&self) -> &[Arc<dyn Constraint>] {
        &self.constraints
    }

    pub fn objective(&self) -> &ObjectiveSum {
        &self.objective
    }

    pub fn distance_expression(&self) -> Option<&Arc<dyn Expression>> {
        self.distance_expression.as_ref()
    }

    /// The outermost ancestor of a plan unit; the unit itself if not nested.
    pub fn root_plan_unit(&self, mut unit: PlanUnitIdx) -> PlanUnitIdx {
        while let Some(parent) = self.plan_units[unit].parent() {
            unit = parent;
        }
        unit
    }

    /// A plan unit is fixed when any of its stops (or any descendant's
    /// stops) is fixed; fixed units must be planned and cannot be unplanned.
    pub fn is_fixed(&self, unit: PlanUnitIdx) -> bool {
        match &self.plan_units[unit] {
            PlanUnit::Stops(unit) => unit
                .stops()
                .iter()
                .any(|&stop| self.stops[stop].is_fixed()),
            PlanUnit::Units(unit) => unit
                .children()
                .iter()
                .any(|&child| self.is_fixed(child)),
        }
    }

    /// All plan-stops descendants of a unit, the unit itself included when
    /// it is one.
    pub fn plan_stops_descendants(&self, unit: PlanUnitIdx) -> Vec<PlanUnitIdx> {
        let mut result = Vec::new();
        let mut pending = vec![unit];
        while let Some(unit) = pending.pop() {
            match &self.plan_units[unit] {
                PlanUnit::Stops(_) => result.push(unit),
                PlanUnit::Units(units) => pending.extend(units.children().iter().copied()),
            }
        }
        result
    }

    /// Total number of stop slots a solution allocates: one per plan-unit
    /// stop plus a start and end slot per vehicle.
    pub(crate) fn number_of_plan_stop_slots(&self) -> usize {
        self.plan_units
            .iter()
            .filter_map(|unit| unit.as_stops())
            .map(|unit| unit.stops().len())
            .sum()
    }

    pub(crate) fn max_expression_index(&self) -> Option<ExpressionIdx> {
        self.expressions
            .iter()
            .map(|expression| expression.index())
            .max()
    }

    pub(crate) fn constraints_at_each_stop(&self) -> &[usize] {
        &self.constraints_at_each_stop
    }

    pub(crate) fn constraints_at_each_vehicle(&self) -> &[usize] {
        &self.constraints_at_each_vehicle
    }

    pub(crate) fn constraints_at_each_solution(&self) -> &[usize] {
        &self.constraints_at_each_solution
    }

    pub(crate) fn constraints_with_stop_data(&self) -> &[usize] {
        &self.constraints_with_stop_data
    }

    pub(crate) fn constraints_with_solution_data(&self) -> &[usize] {
        &self.constraints_with_solution_data
    }

    pub(crate) fn objectives_with_stop_data(&self) -> &[usize] {
        &self.objectives_with_stop_data
    }

    pub(crate) fn objectives_with_solution_data(&self) -> &[usize] {
        &self.objectives_with_solution_data
    }

    /// One-way. The first solution created from the model calls this; the
    /// constraint lock hooks (e.g. the attributes compatibility matrix) run
    /// exactly once.
    pub fn lock(&self) {
        self.locked.get_or_init(|| {
            for constraint in &self.constraints {
                constraint.lock(self);
            }
        });
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get().is_some()
    }

    /// Draws a seed for a new solution RNG from the model RNG.
    pub(crate) fn next_seed(&self) -> u64 {
        self.rng.lock().random()
    }
}

pub struct ModelBuilder {
    epoch: Timestamp,
    stops: Vec<Stop>,
    vehicle_types: Vec<VehicleType>,
    vehicles: Vec<Vehicle>,
    plan_units: Vec<PlanUnit>,
    expressions: Vec<Arc<dyn Expression>>,
    constraints: Vec<Arc<dyn Constraint>>,
    terms: Vec<ObjectiveTerm>,
    distance_expression: Option<Arc<dyn Expression>>,
    seed: u64,
}

impl ModelBuilder {
    pub fn new(epoch: Timestamp) -> Self {
        ModelBuilder {
            epoch,
            stops: Vec::new(),
            vehicle_types: Vec::new(),
            vehicles: Vec::new(),
            plan_units: Vec::new(),
            expressions: Vec::new(),
            constraints: Vec::new(),
            terms: Vec::new(),
            distance_expression: None,
            seed: 0,
        }
    }

    pub fn epoch(&self) -> Timestamp {
        self.epoch
    }

    pub fn set_seed(&mut self, seed: u64) -> &mut ModelBuilder {
        self.seed = seed;
        self
    }

    pub fn add_stop(&mut self, mut stop: Stop) -> StopIdx {
        let index = StopIdx::new(self.stops.len());
        stop.set_index(index);
        self.stops.push(stop);
        index
    }

    pub fn add_vehicle_type(&mut self, mut vehicle_type: VehicleType) -> VehicleTypeIdx {
        let index = VehicleTypeIdx::new(self.vehicle_types.len());
        vehicle_type.set_index(index);
        self.vehicle_types.push(vehicle_type);
        index
    }

    pub fn add_vehicle(&mut self, mut vehicle: Vehicle) -> Result<VehicleIdx, ModelError> {
        for stop in [vehicle.start_stop(), vehicle.end_stop()] {
            if self.stops[stop].plan_unit().is_some() {
                return Err(ModelError::PlanStopAsVehicleStop {
                    vehicle: vehicle.id().to_owned(),
                    stop: self.stops[stop].id().to_owned(),
                });
            }
        }
        let index = VehicleIdx::new(self.vehicles.len());
        vehicle.set_index(index);
        self.vehicles.push(vehicle);
        Ok(index)
    }

    pub fn add_plan_stops_unit(&mut self, stops: Vec<StopIdx>) -> Result<PlanUnitIdx, ModelError> {
        if stops.is_empty() {
            return Err(ModelError::EmptyPlanUnit);
        }
        let mut seen = FxHashSet::default();
        for &stop in &stops {
            if self.stops[stop].plan_unit().is_some() || !seen.insert(stop) {
                return Err(ModelError::DuplicateStopInPlanUnit {
                    stop: self.stops[stop].id().to_owned(),
                });
            }
            if self
                .vehicles
                .iter()
                .any(|vehicle| vehicle.start_stop() == stop || vehicle.end_stop() == stop)
            {
                return Err(ModelError::VehicleStopInPlanUnit {
                    stop: self.stops[stop].id().to_owned(),
                });
            }
        }
        let index = PlanUnitIdx::new(self.plan_units.len());
        for &stop in &stops {
            self.stops[stop].set_plan_unit(index);
        }
        self.plan_units.push(PlanUnit::new_stops(index, stops));
        Ok(index)
    }

    pub fn add_plan_units_unit(
        &mut self,
        children: Vec<PlanUnitIdx>,
        plan_one_of: bool,
    ) -> Result<PlanUnitIdx, ModelError> {
        if children.is_empty() {
            return Err(ModelError::EmptyPlanUnitsUnit);
        }
        for &child in &children {
            if self.plan_units[child].parent().is_some() {
                return Err(ModelError::AlreadyNested { unit: child });
            }
        }
        let index = PlanUnitIdx::new(self.plan_units.len());
        for &child in &children {
            self.plan_units[child].set_parent(index);
        }
        self.plan_units
            .push(PlanUnit::new_units(index, children, plan_one_of));
        Ok(index)
    }

    /// Registers an expression so the evaluator maintains its value and
    /// prefix-sum rows. Registering twice is a no-op.
    pub fn add_expression(&mut self, expression: Arc<dyn Expression>) -> &mut ModelBuilder {
        if !self
            .expressions
            .iter()
            .any(|registered| registered.index() == expression.index())
        {
            self.expressions.push(expression);
        }
        self
    }

    /// Adds a constraint and registers the expressions it declares.
    pub fn add_constraint(&mut self, constraint: Arc<dyn Constraint>) -> &mut ModelBuilder {
        for expression in constraint.expressions() {
            self.add_expression(expression);
        }
        self.constraints.push(constraint);
        self
    }

    pub fn add_objective(&mut self, objective: Arc<dyn Objective>, factor: f64) -> &mut ModelBuilder {
        self.terms.push(ObjectiveTerm::new(factor, objective));
        self
    }

    /// A distance expression used only for reporting in the solution output.
    pub fn set_distance_expression(
        &mut self,
        expression: Arc<dyn Expression>,
    ) -> &mut ModelBuilder {
        self.distance_expression = Some(expression);
        self
    }

    pub fn build(self) -> Result<Model, ModelError> {
        let objective = ObjectiveSum::new(self.terms);

        let mut constraints_at_each_stop = Vec::new();
        let mut constraints_at_each_vehicle = Vec::new();
        let mut constraints_at_each_solution = Vec::new();
        let mut constraints_with_stop_data = Vec::new();
        let mut constraints_with_solution_data = Vec::new();
        for (idx, constraint) in self.constraints.iter().enumerate() {
            match constraint.granularity() {
                crate::solver::constraints::CheckGranularity::AtEachStop => {
                    constraints_at_each_stop.push(idx)
                }
                crate::solver::constraints::CheckGranularity::AtEachVehicle => {
                    constraints_at_each_vehicle.push(idx)
                }
                crate::solver::constraints::CheckGranularity::AtEachSolution => {
                    constraints_at_each_solution.push(idx)
                }
            }
            if constraint.has_stop_data() {
                constraints_with_stop_data.push(idx);
            }
            if constraint.has_solution_data() {
                constraints_with_solution_data.push(idx);
            }
        }

        let mut objectives_with_stop_data = Vec::new();
        let mut objectives_with_solution_data = Vec::new();
        for (idx, term) in objective.terms().iter().enumerate() {
            if term.objective().has_stop_data() {
                objectives_with_stop_data.push(idx);
            }
            if term.objective().has_solution_data() {
                objectives_with_solution_data.push(idx);
            }
        }

        Ok(Model {
            epoch: self.epoch,
            stops: self.stops,
            vehicle_types: self.vehicle_types,
            vehicles: self.vehicles,
            plan_units: self.plan_units,
            expressions: self.expressions,
            constraints: self.constraints,
            objective,
            distance_expression: self.distance_expression,
            constraints_at_each_stop,
            constraints_at_each_vehicle,
            constraints_at_each_solution,
            constraints_with_stop_data,
            constraints_with_solution_data,
            objectives_with_stop_data,
            objectives_with_solution_data,
            rng: Mutex::new(SmallRng::seed_from_u64(self.seed)),
            locked: OnceLock::new(),
        })
    }
}
