//! Inventory domain module.
//!
//! This crate contains business rules for the adoption inventory: the
//! per-project available-unit pool and the physical unit registry.
//! Pure deterministic domain logic, no IO.

pub mod project;
pub mod unit;

pub use project::{Project, ProjectStatus};
pub use unit::{grid_position, Unit, UnitStatus};
