use crate::define_index_newtype;
use crate::model::stop::StopIdx;

define_index_newtype!(PlanUnitIdx);

/// An ordered, non-empty set of stops that must all be planned together, on
/// the same vehicle, in the declared order.
#[derive(Debug)]
pub struct PlanStopsUnit {
    index: PlanUnitIdx,
    stops: Vec<StopIdx>,
    parent: Option<PlanUnitIdx>,
}

impl PlanStopsUnit {
    pub fn index(&self) -> PlanUnitIdx {
        self.index
    }

    pub fn stops(&self) -> &[StopIdx] {
        &self.stops
    }

    pub fn parent(&self) -> Option<PlanUnitIdx> {
        self.parent
    }
}

/// A disjunction or conjunction of plan units. With `plan_one_of` set,
/// exactly one member must be planned; otherwise all members must be.
/// Nesting is permitted.
#[derive(Debug)]
pub struct PlanUnitsUnit {
    index: PlanUnitIdx,
    children: Vec<PlanUnitIdx>,
    plan_one_of: bool,
    parent: Option<PlanUnitIdx>,
}

impl PlanUnitsUnit {
    pub fn index(&self) -> PlanUnitIdx {
        self.index
    }

    pub fn children(&self) -> &[PlanUnitIdx] {
        &self.children
    }

    pub fn plan_one_of(&self) -> bool {
        self.plan_one_of
    }

    pub fn parent(&self) -> Option<PlanUnitIdx> {
        self.parent
    }
}

#[derive(Debug)]
pub enum PlanUnit {
    Stops(PlanStopsUnit),
    Units(PlanUnitsUnit),
}

impl PlanUnit {
    pub(crate) fn new_stops(
        index: PlanUnitIdx,
        stops: Vec<StopIdx>,
    ) -> PlanUnit {
        PlanUnit::Stops(PlanStopsUnit {
            index,
            stops,
            parent: None,
        })
    }

    pub(crate) fn new_units(
        index: PlanUnitIdx,
        children: Vec<PlanUnitIdx>,
        plan_one_of: bool,
    ) -> PlanUnit {
        PlanUnit::Units(PlanUnitsUnit {
            index,
            children,
            plan_one_of,
            parent: None,
        })
    }

    pub fn index(&self) -> PlanUnitIdx {
        match self {
            PlanUnit::Stops(unit) => unit.index,
            PlanUnit::Units(unit) => unit.index,
        }
    }

    pub fn parent(&self) -> Option<PlanUnitIdx> {
        match self {
            PlanUnit::Stops(unit) => unit.parent,
            PlanUnit::Units(unit) => unit.parent,
        }
    }

    pub fn as_stops(&self) -> Option<&PlanStopsUnit> {
        match self {
            PlanUnit::Stops(unit) => Some(unit),
            PlanUnit::Units(_) => None,
        }
    }

    pub fn as_units(&self) -> Option<&PlanUnitsUnit> {
        match self {
            PlanUnit::Stops(_) => None,
            PlanUnit::Units(unit) => Some(unit),
        }
    }

    pub(crate) fn set_parent(&mut self, parent: PlanUnitIdx) {
        match self {
            PlanUnit::Stops(unit) => unit.parent = Some(parent),
            PlanUnit::Units(unit) => unit.parent = Some(parent),
        }
    }
}
