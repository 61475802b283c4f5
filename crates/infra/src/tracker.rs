//! Fulfillment tracking service.
//!
//! Records are born `Adopted` inside `mark_paid`; from there this service
//! walks them forward through the growing cycle. Every batch advance is
//! one conditional update in the store, so a record that already sits at
//! the target is a harmless no-op while a backward or skipped transition
//! fails the whole batch.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use cropshare_core::{DomainError, OrderId, RecordId};
use cropshare_fulfillment::{HarvestOutcome, Record, RecordStatus};

use crate::store::{AdoptionStore, StoreResult};

#[derive(Debug, Clone)]
pub struct FulfillmentTracker<S: ?Sized> {
    store: Arc<S>,
}

impl<S: AdoptionStore + ?Sized> FulfillmentTracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn record(&self, record_id: RecordId) -> StoreResult<Option<Record>> {
        self.store.record(record_id)
    }

    pub fn records_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Record>> {
        self.store.records_for_order(order_id)
    }

    /// Adopted -> Planting, stamping `planting_date`.
    pub fn start_planting(&self, record_ids: &[RecordId]) -> StoreResult<usize> {
        self.advance(record_ids, RecordStatus::Planting, None)
    }

    /// Planting -> AwaitingHarvest.
    pub fn start_harvesting(&self, record_ids: &[RecordId]) -> StoreResult<usize> {
        self.advance(record_ids, RecordStatus::AwaitingHarvest, None)
    }

    /// AwaitingHarvest -> Harvested, stamping date, yield and grade.
    pub fn complete_harvest(
        &self,
        record_ids: &[RecordId],
        actual_yield: u64,
        quality_grade: impl Into<String>,
    ) -> StoreResult<usize> {
        let quality_grade = quality_grade.into();
        if quality_grade.trim().is_empty() {
            return Err(DomainError::validation("quality_grade cannot be empty").into());
        }
        let outcome = HarvestOutcome {
            harvested_at: Utc::now(),
            actual_yield,
            quality_grade,
        };
        self.advance(record_ids, RecordStatus::Harvested, Some(&outcome))
    }

    /// Harvested -> Completed. Terminal.
    pub fn complete_adoption(&self, record_ids: &[RecordId]) -> StoreResult<usize> {
        self.advance(record_ids, RecordStatus::Completed, None)
    }

    fn advance(
        &self,
        record_ids: &[RecordId],
        target: RecordStatus,
        outcome: Option<&HarvestOutcome>,
    ) -> StoreResult<usize> {
        if record_ids.is_empty() {
            return Ok(0);
        }
        let advanced = self
            .store
            .advance_records(record_ids, target, Utc::now(), outcome)?;
        info!(
            batch = record_ids.len(),
            advanced,
            ?target,
            "records advanced"
        );
        Ok(advanced)
    }
}
