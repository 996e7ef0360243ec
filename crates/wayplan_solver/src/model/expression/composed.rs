use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::expression::{Expression, ExpressionIdx, next_expression_index};
use crate::model::stop::Stop;
use crate::model::vehicle::{VehicleType, VehicleTypeIdx};

/// A default expression plus a sparse, index-keyed table of per-vehicle-type
/// overrides. Overrides are installed on the write side during model
/// build-up, never concurrently with reads.
pub struct ComposedPerVehicleTypeExpression {
    index: ExpressionIdx,
    name: RwLock<String>,
    default_expression: Arc<dyn Expression>,
    expressions: Vec<Option<Arc<dyn Expression>>>,
}

impl ComposedPerVehicleTypeExpression {
    pub fn new(default_expression: Arc<dyn Expression>) -> Self {
        let index = next_expression_index();
        ComposedPerVehicleTypeExpression {
            index,
            name: RwLock::new(format!("composed_per_vehicle_type[{index}]")),
            default_expression,
            expressions: Vec::new(),
        }
    }

    pub fn default_expression(&self) -> &Arc<dyn Expression> {
        &self.default_expression
    }

    pub fn get(&self, vehicle_type: VehicleTypeIdx) -> &Arc<dyn Expression> {
        self.expressions
            .get(vehicle_type.get())
            .and_then(|expression| expression.as_ref())
            .unwrap_or(&self.default_expression)
    }

    pub fn set(&mut self, vehicle_type: VehicleTypeIdx, expression: Arc<dyn Expression>) {
        let idx = vehicle_type.get();
        if idx >= self.expressions.len() {
            self.expressions.resize_with(idx + 1, || None);
        }
        self.expressions[idx] = Some(expression);
    }
}

impl Expression for ComposedPerVehicleTypeExpression {
    fn index(&self) -> ExpressionIdx {
        self.index
    }

    fn name(&self) -> String {
        self.name.read().clone()
    }

    fn set_name(&self, name: &str) {
        *self.name.write() = name.to_owned();
    }

    fn value(&self, vehicle_type: &VehicleType, from: &Stop, to: &Stop) -> f64 {
        self.get(vehicle_type.index()).value(vehicle_type, from, to)
    }

    fn has_negative_values(&self) -> bool {
        self.default_expression.has_negative_values()
            || self
                .expressions
                .iter()
                .flatten()
                .any(|expression| expression.has_negative_values())
    }

    fn has_positive_values(&self) -> bool {
        self.default_expression.has_positive_values()
            || self
                .expressions
                .iter()
                .flatten()
                .any(|expression| expression.has_positive_values())
    }
}

/// One value per vehicle type with a default, ignoring the edge. Used for
/// per-vehicle-type limits such as a maximum route distance.
pub struct VehicleTypeValueExpression {
    index: ExpressionIdx,
    name: RwLock<String>,
    default_value: f64,
    values: Vec<Option<f64>>,
    has_negative: bool,
    has_positive: bool,
}

impl VehicleTypeValueExpression {
    pub fn new(name: &str, default_value: f64) -> Self {
        VehicleTypeValueExpression {
            index: next_expression_index(),
            name: RwLock::new(name.to_owned()),
            default_value,
            values: Vec::new(),
            has_negative: default_value < 0.0,
            has_positive: default_value > 0.0,
        }
    }

    pub fn set_value(&mut self, vehicle_type: VehicleTypeIdx, value: f64) {
        let idx = vehicle_type.get();
        if idx >= self.values.len() {
            self.values.resize(idx + 1, None);
        }
        self.values[idx] = Some(value);
        self.has_negative |= value < 0.0;
        self.has_positive |= value > 0.0;
    }

    pub fn value_for(&self, vehicle_type: VehicleTypeIdx) -> f64 {
        self.values
            .get(vehicle_type.get())
            .copied()
            .flatten()
            .unwrap_or(self.default_value)
    }
}

impl Expression for VehicleTypeValueExpression {
    fn index(&self) -> ExpressionIdx {
        self.index
    }

    fn name(&self) -> String {
        self.name.read().clone()
    }

    fn set_name(&self, name: &str) {
        *self.name.write() = name.to_owned();
    }

    fn value(&self, vehicle_type: &VehicleType, _from: &Stop, _to: &Stop) -> f64 {
        self.value_for(vehicle_type.index())
    }

    fn has_negative_values(&self) -> bool {
        self.has_negative
    }

    fn has_positive_values(&self) -> bool {
        self.has_positive
    }
}
