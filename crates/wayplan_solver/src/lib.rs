//! Core solver data structures and move machinery of the wayplan
//! vehicle-routing engine: the model of stops, vehicles and plan units, the
//! mutable solution state with its incremental evaluator, the best-move
//! search over a plan unit, and the initial-solution loader.
//!
//! Optimization strategies, input parsing and output formatting live in the
//! surrounding crates; they talk to this one through the [`solver::constraints::Constraint`],
//! [`solver::objectives::Objective`] and [`model::expression::Expression`]
//! contracts.

pub mod model;
pub mod solver;
mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
