use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::define_index_newtype;
use crate::model::stop::Stop;
use crate::model::vehicle::VehicleType;

mod composed;
mod time;

pub use composed::{ComposedPerVehicleTypeExpression, VehicleTypeValueExpression};
pub use time::{StopTimeExpression, TimeExpression};

define_index_newtype!(ExpressionIdx);

static NEXT_EXPRESSION_INDEX: AtomicUsize = AtomicUsize::new(0);

/// Allocates a process-wide unique dense expression index. Expressions can be
/// created independently of any model; a solution only materializes value
/// rows for the expressions its model registered.
pub fn next_expression_index() -> ExpressionIdx {
    ExpressionIdx::new(NEXT_EXPRESSION_INDEX.fetch_add(1, Ordering::Relaxed))
}

/// An edge-indexed numeric function. Expressions are the only way constraints
/// and objectives read edge costs; the incremental evaluator maintains a
/// value and a prefix sum per registered expression along every route.
///
/// The sign hints let constraints reason about monotonicity:
/// `has_negative_values() == false` guarantees no `value` call returns a
/// negative number for the model's stops and vehicle types.
pub trait Expression: Send + Sync {
    fn index(&self) -> ExpressionIdx;

    fn name(&self) -> String;

    fn set_name(&self, name: &str);

    fn value(&self, vehicle_type: &VehicleType, from: &Stop, to: &Stop) -> f64;

    fn has_negative_values(&self) -> bool;

    fn has_positive_values(&self) -> bool;
}

/// The same value for every edge.
pub struct ConstantExpression {
    index: ExpressionIdx,
    name: RwLock<String>,
    value: f64,
}

impl ConstantExpression {
    pub fn new(name: &str, value: f64) -> Self {
        ConstantExpression {
            index: next_expression_index(),
            name: RwLock::new(name.to_owned()),
            value,
        }
    }
}

impl Expression for ConstantExpression {
    fn index(&self) -> ExpressionIdx {
        self.index
    }

    fn name(&self) -> String {
        self.name.read().clone()
    }

    fn set_name(&self, name: &str) {
        *self.name.write() = name.to_owned();
    }

    fn value(&self, _vehicle_type: &VehicleType, _from: &Stop, _to: &Stop) -> f64 {
        self.value
    }

    fn has_negative_values(&self) -> bool {
        self.value < 0.0
    }

    fn has_positive_values(&self) -> bool {
        self.value > 0.0
    }
}

/// A dense `from x to` table of edge values, the usual shape of distance and
/// duration matrices. Sign hints are computed once at construction.
pub struct MatrixExpression {
    index: ExpressionIdx,
    name: RwLock<String>,
    values: Vec<Vec<f64>>,
    has_negative: bool,
    has_positive: bool,
}

impl MatrixExpression {
    pub fn new(name: &str, values: Vec<Vec<f64>>) -> Self {
        let has_negative = values.iter().flatten().any(|&v| v < 0.0);
        let has_positive = values.iter().flatten().any(|&v| v > 0.0);
        MatrixExpression {
            index: next_expression_index(),
            name: RwLock::new(name.to_owned()),
            values,
            has_negative,
            has_positive,
        }
    }
}

impl Expression for MatrixExpression {
    fn index(&self) -> ExpressionIdx {
        self.index
    }

    fn name(&self) -> String {
        self.name.read().clone()
    }

    fn set_name(&self, name: &str) {
        *self.name.write() = name.to_owned();
    }

    fn value(&self, _vehicle_type: &VehicleType, from: &Stop, to: &Stop) -> f64 {
        self.values[from.index().get()][to.index().get()]
    }

    fn has_negative_values(&self) -> bool {
        self.has_negative
    }

    fn has_positive_values(&self) -> bool {
        self.has_positive
    }
}
