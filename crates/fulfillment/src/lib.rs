//! Fulfillment domain module.
//!
//! This crate contains business rules for per-unit fulfillment records,
//! tracking the planting-to-harvest progress of one paid order's unit.
//! Pure deterministic domain logic, no IO.

pub mod record;

pub use record::{HarvestOutcome, Record, RecordStatus};
