//! Storage layer: the adoption store contract and its backends.

pub mod in_memory;
pub mod postgres;
mod r#trait;

pub use in_memory::InMemoryAdoptionStore;
pub use postgres::PostgresAdoptionStore;
pub use r#trait::{AdoptionStore, PaidOutcome, StoreError, StoreResult};
