//! Infrastructure layer: storage, application services, background sweeps.

pub mod config;
pub mod ledger;
pub mod pool;
pub mod reaper;
pub mod registry;
pub mod store;
pub mod tracker;


pub use config::ConfigCache;
pub use ledger::{DiscountPolicy, NoDiscount, ReservationLedger};
pub use pool::InventoryPool;
pub use reaper::{ReaperConfig, ReaperHandle, ReaperStats, SweepReport, TimeoutReaper};
pub use registry::UnitRegistry;
pub use store::{
    AdoptionStore, InMemoryAdoptionStore, PaidOutcome, PostgresAdoptionStore, StoreError,
    StoreResult,
};
pub use tracker::FulfillmentTracker;
