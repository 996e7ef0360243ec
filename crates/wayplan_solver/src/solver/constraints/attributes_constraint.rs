use std::sync::OnceLock;

use fxhash::{FxHashMap, FxHashSet};

use crate::model::model::Model;
use crate::model::stop::StopIdx;
use crate::model::vehicle::VehicleTypeIdx;
use crate::solver::constraints::{CheckGranularity, Constraint, PositionsHint};
use crate::solver::moves::MoveStops;
use crate::solver::solution::Solution;

struct CompatibilityMatrix {
    vehicle_types: usize,
    compatible: Vec<bool>,
}

impl CompatibilityMatrix {
    fn index(&self, unit: usize, vehicle_type: usize) -> usize {
        unit * self.vehicle_types + vehicle_type
    }
}

/// Attribute compatibility between stops and vehicle types. A plan stops
/// unit is compatible with a vehicle type iff every stop in the unit either
/// has no attributes or shares at least one attribute with the vehicle type.
/// The dense compatibility matrix is precomputed at model lock, making the
/// estimate an O(1) bit probe.
pub struct AttributesConstraint {
    id: String,
    stop_attributes: FxHashMap<StopIdx, Vec<String>>,
    vehicle_type_attributes: FxHashMap<VehicleTypeIdx, Vec<String>>,
    matrix: OnceLock<CompatibilityMatrix>,
}

impl AttributesConstraint {
    pub fn new() -> Self {
        AttributesConstraint {
            id: "attributes".to_owned(),
            stop_attributes: FxHashMap::default(),
            vehicle_type_attributes: FxHashMap::default(),
            matrix: OnceLock::new(),
        }
    }

    pub fn set_stop_attributes(&mut self, stop: StopIdx, attributes: Vec<String>) {
        let unique: FxHashSet<String> = attributes.into_iter().collect();
        self.stop_attributes
            .insert(stop, unique.into_iter().collect());
    }

    pub fn set_vehicle_type_attributes(
        &mut self,
        vehicle_type: VehicleTypeIdx,
        attributes: Vec<String>,
    ) {
        let unique: FxHashSet<String> = attributes.into_iter().collect();
        self.vehicle_type_attributes
            .insert(vehicle_type, unique.into_iter().collect());
    }

    pub fn stop_attributes(&self, stop: StopIdx) -> &[String] {
        self.stop_attributes
            .get(&stop)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn vehicle_type_attributes(&self, vehicle_type: VehicleTypeIdx) -> &[String] {
        self.vehicle_type_attributes
            .get(&vehicle_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for AttributesConstraint {
    fn default() -> Self {
        AttributesConstraint::new()
    }
}

impl Constraint for AttributesConstraint {
    fn id(&self) -> &str {
        &self.id
    }

    fn granularity(&self) -> CheckGranularity {
        CheckGranularity::AtEachStop
    }

    fn lock(&self, model: &Model) {
        self.matrix.get_or_init(|| {
            let vehicle_types = model.vehicle_types().len();

            let vehicle_type_sets: Vec<FxHashSet<&str>> = model
                .vehicle_types()
                .iter()
                .map(|vehicle_type| {
                    self.vehicle_type_attributes
                        .get(&vehicle_type.index())
                        .map(|attributes| {
                            attributes.iter().map(String::as_str).collect()
                        })
                        .unwrap_or_default()
                })
                .collect();

            // Which stops are individually compatible with which vehicle
            // types.
            let mut stop_compatible = vec![false; model.stops().len() * vehicle_types];
            for stop in model.stops() {
                let attributes = self.stop_attributes(stop.index());
                for vt in 0..vehicle_types {
                    stop_compatible[stop.index().get() * vehicle_types + vt] = attributes
                        .is_empty()
                        || attributes
                            .iter()
                            .any(|attribute| vehicle_type_sets[vt].contains(attribute.as_str()));
                }
            }

            let mut compatible = vec![false; model.plan_units().len() * vehicle_types];
            for unit in model.plan_units() {
                let Some(stops_unit) = unit.as_stops() else {
                    continue;
                };
                for vt in 0..vehicle_types {
                    compatible[unit.index().get() * vehicle_types + vt] = stops_unit
                        .stops()
                        .iter()
                        .all(|&stop| stop_compatible[stop.get() * vehicle_types + vt]);
                }
            }

            CompatibilityMatrix {
                vehicle_types,
                compatible,
            }
        });
    }

    fn estimate_is_violated(&self, solution: &Solution, mv: &MoveStops) -> (bool, PositionsHint) {
        let matrix = self
            .matrix
            .get()
            .expect("attributes constraint used before model lock");
        let vehicle_type = solution.vehicle_type_of_move(mv);
        let idx = matrix.index(mv.plan_unit().get(), vehicle_type.get());
        if matrix.compatible[idx] {
            (false, PositionsHint::None)
        } else {
            (true, PositionsHint::SkipVehicle)
        }
    }
}
