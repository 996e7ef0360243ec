use std::sync::Arc;
use std::sync::OnceLock;

use jiff::{SignedDuration, Timestamp};
use parking_lot::RwLock;

use crate::model::expression::{Expression, ExpressionIdx, next_expression_index};
use crate::model::stop::{Stop, StopIdx};
use crate::model::vehicle::VehicleType;

/// Interprets an inner edge expression as seconds since an epoch. Carries no
/// storage beyond the inner expression.
pub struct TimeExpression {
    index: ExpressionIdx,
    name: RwLock<String>,
    expression: Arc<dyn Expression>,
    epoch: Timestamp,
}

impl TimeExpression {
    pub fn new(expression: Arc<dyn Expression>, epoch: Timestamp) -> Self {
        let name = format!("{} since {}", expression.name(), epoch);
        TimeExpression {
            index: next_expression_index(),
            name: RwLock::new(name),
            expression,
            epoch,
        }
    }

    pub fn time(&self, vehicle_type: &VehicleType, from: &Stop, to: &Stop) -> Timestamp {
        let value = self.expression.value(vehicle_type, from, to);
        self.epoch + SignedDuration::from_secs_f64(value)
    }
}

impl Expression for TimeExpression {
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
        self.expression.value(vehicle_type, from, to)
    }

    fn has_negative_values(&self) -> bool {
        self.expression.has_negative_values()
    }

    fn has_positive_values(&self) -> bool {
        self.expression.has_positive_values()
    }
}

/// A time keyed by destination stop index, with a lazily computed default.
/// Values are stored as seconds since the model epoch. By construction the
/// expression is non-negative, possibly positive.
pub struct StopTimeExpression {
    index: ExpressionIdx,
    name: RwLock<String>,
    epoch: Timestamp,
    default_time: Timestamp,
    values: Vec<f64>,
    has_value: Vec<bool>,
    default_value: OnceLock<f64>,
}

impl StopTimeExpression {
    pub fn new(name: &str, default_time: Timestamp, epoch: Timestamp) -> Self {
        StopTimeExpression {
            index: next_expression_index(),
            name: RwLock::new(name.to_owned()),
            epoch,
            default_time,
            values: Vec::new(),
            has_value: Vec::new(),
            default_value: OnceLock::new(),
        }
    }

    /// Sets the time for a destination stop. Panics if `time` precedes the
    /// model epoch; that is a bug in the caller, not recoverable input.
    pub fn set_time(&mut self, stop: StopIdx, time: Timestamp) {
        assert!(
            time >= self.epoch,
            "time {time} for expression {} precedes the model epoch {}",
            self.name.read(),
            self.epoch,
        );
        let idx = stop.get();
        if idx >= self.values.len() {
            self.values.resize(idx + 1, 0.0);
            self.has_value.resize(idx + 1, false);
        }
        self.values[idx] = time.duration_since(self.epoch).as_secs_f64();
        self.has_value[idx] = true;
    }

    pub fn time(&self, stop: StopIdx) -> Timestamp {
        let idx = stop.get();
        if idx < self.has_value.len() && self.has_value[idx] {
            return self.epoch + SignedDuration::from_secs_f64(self.values[idx]);
        }
        self.default_time
    }

    fn default_time_value(&self) -> f64 {
        *self.default_value.get_or_init(|| {
            assert!(
                self.default_time >= self.epoch,
                "default time {} for expression {} precedes the model epoch {}",
                self.default_time,
                self.name.read(),
                self.epoch,
            );
            self.default_time.duration_since(self.epoch).as_secs_f64()
        })
    }
}

impl Expression for StopTimeExpression {
    fn index(&self) -> ExpressionIdx {
        self.index
    }

    fn name(&self) -> String {
        self.name.read().clone()
    }

    fn set_name(&self, name: &str) {
        *self.name.write() = name.to_owned();
    }

    fn value(&self, _vehicle_type: &VehicleType, _from: &Stop, to: &Stop) -> f64 {
        let idx = to.index().get();
        if idx < self.has_value.len() && self.has_value[idx] {
            return self.values[idx];
        }
        self.default_time_value()
    }

    fn has_negative_values(&self) -> bool {
        false
    }

    fn has_positive_values(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> Timestamp {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_stop_time_default_is_lazy() {
        let expression =
            StopTimeExpression::new("opens", epoch() + SignedDuration::from_mins(10), epoch());
        assert_eq!(expression.default_time_value(), 600.0);
    }

    #[test]
    #[should_panic(expected = "precedes the model epoch")]
    fn test_stop_time_default_before_epoch_is_fatal() {
        let expression =
            StopTimeExpression::new("opens", epoch() - SignedDuration::from_mins(1), epoch());
        expression.default_time_value();
    }

    #[test]
    #[should_panic(expected = "precedes the model epoch")]
    fn test_set_time_before_epoch_is_fatal() {
        let mut expression = StopTimeExpression::new("opens", epoch(), epoch());
        expression.set_time(StopIdx::new(0), epoch() - SignedDuration::from_secs(1));
    }

    #[test]
    fn test_stop_time_grows_storage() {
        let mut expression = StopTimeExpression::new("opens", epoch(), epoch());
        expression.set_time(StopIdx::new(5), epoch() + SignedDuration::from_secs(30));
        assert_eq!(
            expression.time(StopIdx::new(5)),
            epoch() + SignedDuration::from_secs(30)
        );
        assert_eq!(expression.time(StopIdx::new(2)), epoch());
    }
}
