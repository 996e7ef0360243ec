use crate::define_index_newtype;
use crate::model::location::Location;
use crate::model::plan_unit::PlanUnitIdx;

define_index_newtype!(StopIdx);

/// A point a vehicle can visit. Stops that belong to a plan unit are planned
/// through it; the start and end stops of vehicles belong to no plan unit.
#[derive(Debug)]
pub struct Stop {
    index: StopIdx,
    id: String,
    location: Option<Location>,
    plan_unit: Option<PlanUnitIdx>,
    fixed: bool,
}

impl Stop {
    pub fn index(&self) -> StopIdx {
        self.index
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// The plan stops unit that owns this stop, if any.
    pub fn plan_unit(&self) -> Option<PlanUnitIdx> {
        self.plan_unit
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub(crate) fn set_index(&mut self, index: StopIdx) {
        self.index = index;
    }

    pub(crate) fn set_plan_unit(&mut self, plan_unit: PlanUnitIdx) {
        self.plan_unit = Some(plan_unit);
    }
}

#[derive(Default)]
pub struct StopBuilder {
    id: Option<String>,
    location: Option<Location>,
    fixed: Option<bool>,
}

impl StopBuilder {
    pub fn set_id(&mut self, id: impl Into<String>) -> &mut StopBuilder {
        self.id = Some(id.into());
        self
    }

    pub fn set_location(&mut self, location: Location) -> &mut StopBuilder {
        self.location = Some(location);
        self
    }

    pub fn set_fixed(&mut self, fixed: bool) -> &mut StopBuilder {
        self.fixed = Some(fixed);
        self
    }

    pub fn build(self) -> Stop {
        Stop {
            index: StopIdx::default(),
            id: self.id.expect("stop ID is required"),
            location: self.location,
            plan_unit: None,
            fixed: self.fixed.unwrap_or(false),
        }
    }
}
