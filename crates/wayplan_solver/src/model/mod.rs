pub mod expression;
pub mod location;
#[allow(clippy::module_inception)]
pub mod model;
pub mod plan_unit;
pub mod stop;
pub mod vehicle;
