use std::any::Any;
use std::sync::Arc;

use jiff::Timestamp;

use crate::define_index_newtype;
use crate::model::expression::{ConstantExpression, Expression};
use crate::model::stop::{Stop, StopIdx};

define_index_newtype!(VehicleTypeIdx);
define_index_newtype!(VehicleIdx);

/// Times the evaluator writes for one stop, all in seconds since the model
/// epoch except `travel_duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalValues {
    pub travel_duration: f64,
    pub arrival: f64,
    pub start: f64,
    pub end: f64,
}

/// Parameters shared by a class of vehicles: a travel-duration expression
/// (edge to seconds), the earliest service start per stop and the processing
/// duration per stop. Carries an opaque user-data slot for surrounding code.
pub struct VehicleType {
    index: VehicleTypeIdx,
    id: String,
    travel_duration: Arc<dyn Expression>,
    earliest_start: Arc<dyn Expression>,
    process_duration: Arc<dyn Expression>,
    data: Option<Box<dyn Any + Send + Sync>>,
}

impl VehicleType {
    pub fn index(&self) -> VehicleTypeIdx {
        self.index
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn travel_duration(&self) -> &Arc<dyn Expression> {
        &self.travel_duration
    }

    pub fn earliest_start(&self) -> &Arc<dyn Expression> {
        &self.earliest_start
    }

    pub fn process_duration(&self) -> &Arc<dyn Expression> {
        &self.process_duration
    }

    pub fn data(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.data.as_deref()
    }

    /// Travel, arrival, service start and end at `to`, given the departure
    /// time at `from`. A stop never starts before its earliest service start;
    /// the gap between arrival and start is waiting slack.
    pub fn temporal_values(&self, from_end: f64, from: &Stop, to: &Stop) -> TemporalValues {
        let travel_duration = self.travel_duration.value(self, from, to);
        let arrival = from_end + travel_duration;
        let start = arrival.max(self.earliest_start.value(self, from, to));
        let end = start + self.process_duration.value(self, from, to);
        TemporalValues {
            travel_duration,
            arrival,
            start,
            end,
        }
    }

    pub(crate) fn set_index(&mut self, index: VehicleTypeIdx) {
        self.index = index;
    }
}

#[derive(Default)]
pub struct VehicleTypeBuilder {
    id: Option<String>,
    travel_duration: Option<Arc<dyn Expression>>,
    earliest_start: Option<Arc<dyn Expression>>,
    process_duration: Option<Arc<dyn Expression>>,
    data: Option<Box<dyn Any + Send + Sync>>,
}

impl VehicleTypeBuilder {
    pub fn set_id(&mut self, id: impl Into<String>) -> &mut VehicleTypeBuilder {
        self.id = Some(id.into());
        self
    }

    pub fn set_travel_duration(
        &mut self,
        expression: Arc<dyn Expression>,
    ) -> &mut VehicleTypeBuilder {
        self.travel_duration = Some(expression);
        self
    }

    pub fn set_earliest_start(
        &mut self,
        expression: Arc<dyn Expression>,
    ) -> &mut VehicleTypeBuilder {
        self.earliest_start = Some(expression);
        self
    }

    pub fn set_process_duration(
        &mut self,
        expression: Arc<dyn Expression>,
    ) -> &mut VehicleTypeBuilder {
        self.process_duration = Some(expression);
        self
    }

    pub fn set_data(&mut self, data: Box<dyn Any + Send + Sync>) -> &mut VehicleTypeBuilder {
        self.data = Some(data);
        self
    }

    pub fn build(self) -> VehicleType {
        VehicleType {
            index: VehicleTypeIdx::default(),
            id: self.id.expect("vehicle type ID is required"),
            travel_duration: self
                .travel_duration
                .expect("travel duration expression is required"),
            earliest_start: self
                .earliest_start
                .unwrap_or_else(|| Arc::new(ConstantExpression::new("earliest-start", 0.0))),
            process_duration: self
                .process_duration
                .unwrap_or_else(|| Arc::new(ConstantExpression::new("process-duration", 0.0))),
            data: self.data,
        }
    }
}

/// A vehicle type instance with an absolute start time, a start stop and an
/// end stop. `initial_stops` is the user-supplied seed route consumed by the
/// initial-solution loader.
pub struct Vehicle {
    index: VehicleIdx,
    id: String,
    vehicle_type: VehicleTypeIdx,
    start_time: Timestamp,
    start_stop: StopIdx,
    end_stop: StopIdx,
    initial_stops: Vec<StopIdx>,
}

impl Vehicle {
    pub fn index(&self) -> VehicleIdx {
        self.index
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn vehicle_type(&self) -> VehicleTypeIdx {
        self.vehicle_type
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn start_stop(&self) -> StopIdx {
        self.start_stop
    }

    pub fn end_stop(&self) -> StopIdx {
        self.end_stop
    }

    pub fn initial_stops(&self) -> &[StopIdx] {
        &self.initial_stops
    }

    pub(crate) fn set_index(&mut self, index: VehicleIdx) {
        self.index = index;
    }
}

#[derive(Default)]
pub struct VehicleBuilder {
    id: Option<String>,
    vehicle_type: Option<VehicleTypeIdx>,
    start_time: Option<Timestamp>,
    start_stop: Option<StopIdx>,
    end_stop: Option<StopIdx>,
    initial_stops: Vec<StopIdx>,
}

impl VehicleBuilder {
    pub fn set_id(&mut self, id: impl Into<String>) -> &mut VehicleBuilder {
        self.id = Some(id.into());
        self
    }

    pub fn set_vehicle_type(&mut self, vehicle_type: VehicleTypeIdx) -> &mut VehicleBuilder {
        self.vehicle_type = Some(vehicle_type);
        self
    }

    pub fn set_start_time(&mut self, start_time: Timestamp) -> &mut VehicleBuilder {
        self.start_time = Some(start_time);
        self
    }

    pub fn set_start_stop(&mut self, start_stop: StopIdx) -> &mut VehicleBuilder {
        self.start_stop = Some(start_stop);
        self
    }

    pub fn set_end_stop(&mut self, end_stop: StopIdx) -> &mut VehicleBuilder {
        self.end_stop = Some(end_stop);
        self
    }

    pub fn set_initial_stops(&mut self, initial_stops: Vec<StopIdx>) -> &mut VehicleBuilder {
        self.initial_stops = initial_stops;
        self
    }

    pub fn build(self) -> Vehicle {
        Vehicle {
            index: VehicleIdx::default(),
            id: self.id.expect("vehicle ID is required"),
            vehicle_type: self.vehicle_type.expect("vehicle type is required"),
            start_time: self.start_time.expect("vehicle start time is required"),
            start_stop: self.start_stop.expect("vehicle start stop is required"),
            end_stop: self.end_stop.expect("vehicle end stop is required"),
            initial_stops: self.initial_stops,
        }
    }
}
