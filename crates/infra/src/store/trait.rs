use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use cropshare_core::{DomainError, OrderId, ProjectId, RecordId, UnitId};
use cropshare_fulfillment::{HarvestOutcome, Record, RecordStatus};
use cropshare_inventory::{Project, ProjectStatus, Unit, UnitStatus};
use cropshare_orders::{Order, PaymentStamp};

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage operation error.
///
/// Deterministic business failures surface as `Domain` so services and the
/// API can branch on kind; everything environmental (connections, pools,
/// serialization, poisoned locks) is `Storage`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// Everything produced by marking an order paid in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidOutcome {
    pub order: Order,
    /// One `Adopted` record per allocated unit, in allocation order.
    pub records: Vec<Record>,
}

/// Relational store for the four adoption tables (projects, units, orders,
/// records).
///
/// ## Atomicity contract
///
/// Every compound operation below (`create_order`, `mark_paid`,
/// `cancel_order`, `complete_order`, `request_refund`, `settle_refund`,
/// `advance_units`, `advance_records`) executes as **one transaction**
/// spanning all rows it touches. Any failure inside the set rolls the whole
/// transaction back; callers never observe a partially-applied mutation
/// across order/unit/record/pool state.
///
/// ## Conditional-update contract
///
/// The pool counter and every status change must be expressed as a single
/// conditional update (`available_units = available_units - n WHERE
/// available_units >= n`, `SET status = .. WHERE status = ..`), **never** a
/// read-modify-write pair. A load-then-store rendition of the counter
/// decrement oversells under concurrent `create_order` calls; a
/// non-conditional status write lets the timeout reaper and a concurrent
/// user action both win. Implementations that cannot express this natively
/// must hold an exclusive lock for the full transaction.
///
/// ## Soft deletion
///
/// All rows carry a logical `deleted` flag; every read excludes deleted
/// rows.
pub trait AdoptionStore: Send + Sync {
    // ---- reads -------------------------------------------------------

    fn project(&self, id: ProjectId) -> StoreResult<Option<Project>>;

    fn order(&self, id: OrderId) -> StoreResult<Option<Order>>;

    fn order_by_no(&self, order_no: &str) -> StoreResult<Option<Order>>;

    fn record(&self, id: RecordId) -> StoreResult<Option<Record>>;

    /// Records for one order, in allocation order.
    fn records_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Record>>;

    fn unit(&self, id: UnitId) -> StoreResult<Option<Unit>>;

    /// Units of a project in creation (unit-number) order.
    fn units_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Unit>>;

    /// Pending orders created strictly before `cutoff`, oldest first.
    fn expired_pending_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Order>>;

    // ---- catalog-boundary writes ------------------------------------

    /// Insert a project row. Owned by the catalog collaborator at project
    /// setup; exposed here for wiring and tests.
    fn insert_project(&self, project: &Project) -> StoreResult<()>;

    /// Insert the project's unit batch.
    fn insert_units(&self, units: &[Unit]) -> StoreResult<()>;

    /// Conditional project lifecycle flip: `from` -> `to` iff the project
    /// is currently at `from`, else `InvalidStateTransition`.
    fn set_project_status(
        &self,
        project_id: ProjectId,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> StoreResult<Project>;

    // ---- pool counter (single conditional update) -------------------

    /// Subtract `count` from `available_units` iff the result stays >= 0
    /// and the project is `Adopting`. Fails `InsufficientInventory` or
    /// `InvalidStateTransition` accordingly.
    fn reserve_units(&self, project_id: ProjectId, count: u32) -> StoreResult<()>;

    /// Add `count` back to `available_units`. No upper-bound check: `count`
    /// was previously validly reserved.
    fn release_pool(&self, project_id: ProjectId, count: u32) -> StoreResult<()>;

    // ---- atomic compound operations ----------------------------------

    /// Reserve `order.unit_count` units from the pool and insert the
    /// Pending order, atomically. No concrete units are chosen yet.
    fn create_order(&self, order: &Order) -> StoreResult<()>;

    /// Pending -> Paid, allocate the order's units (Available -> Adopted,
    /// creation order) and insert one Adopted record per unit, atomically.
    fn mark_paid(&self, order_id: OrderId, stamp: &PaymentStamp) -> StoreResult<PaidOutcome>;

    /// Pending -> Cancelled plus pool release, atomically. Shared by user
    /// cancellation and the timeout reaper; the conditional status guard
    /// ensures exactly one of a racing pair wins.
    fn cancel_order(&self, order_id: OrderId) -> StoreResult<Order>;

    /// Paid -> Completed. Terminal at the order level.
    fn complete_order(&self, order_id: OrderId) -> StoreResult<Order>;

    /// Paid -> Refunded (refund intent). No inventory change.
    fn request_refund(&self, order_id: OrderId) -> StoreResult<Order>;

    /// Settle a refund intent. Approved: release the order's allocated
    /// units and the pool counter, retaining the fulfillment records.
    /// Rejected: take the Refunded -> Paid back-edge, but only while the
    /// intent is unsettled (units still `Adopted`). Either way atomic and
    /// guarded by conditional updates on the order row, so of two racing
    /// settlements exactly one wins; a second approval attempt fails
    /// because the units are no longer `Adopted`, and a rejection after an
    /// approval fails for the same reason.
    fn settle_refund(&self, order_id: OrderId, approved: bool) -> StoreResult<Order>;

    // ---- unit registry ----------------------------------------------

    /// Transition `count` Available units of the project to Adopted, in
    /// creation order, returning their ids. Fails `InsufficientInventory`
    /// if fewer are available, even when the pool counter said otherwise.
    fn allocate_units(&self, project_id: ProjectId, count: u32) -> StoreResult<Vec<UnitId>>;

    /// Return the given units to Available. Only `Adopted` units may be
    /// released; any unit further along fails the whole batch.
    fn release_units(&self, unit_ids: &[UnitId]) -> StoreResult<()>;

    /// Bulk adjacent transition over the id set as one conditional update:
    /// every unit must currently be at `from` or the batch fails
    /// `InvalidStateTransition` and nothing moves.
    fn advance_units(&self, unit_ids: &[UnitId], from: UnitStatus, to: UnitStatus)
        -> StoreResult<()>;

    // ---- fulfillment records ----------------------------------------

    /// Bulk forward advance over the id set, atomically. Records already at
    /// `target` are no-ops; every other record must be at the immediate
    /// predecessor or the batch fails. Stamps `planting_date` on
    /// `Planting`, and the harvest outcome (date, yield, grade) on
    /// `Harvested`. Returns the number of records actually advanced.
    fn advance_records(
        &self,
        record_ids: &[RecordId],
        target: RecordStatus,
        now: DateTime<Utc>,
        outcome: Option<&HarvestOutcome>,
    ) -> StoreResult<usize>;
}

impl<S> AdoptionStore for Arc<S>
where
    S: AdoptionStore + ?Sized,
{
    fn project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        (**self).project(id)
    }

    fn order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        (**self).order(id)
    }

    fn order_by_no(&self, order_no: &str) -> StoreResult<Option<Order>> {
        (**self).order_by_no(order_no)
    }

    fn record(&self, id: RecordId) -> StoreResult<Option<Record>> {
        (**self).record(id)
    }

    fn records_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Record>> {
        (**self).records_for_order(order_id)
    }

    fn unit(&self, id: UnitId) -> StoreResult<Option<Unit>> {
        (**self).unit(id)
    }

    fn units_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Unit>> {
        (**self).units_for_project(project_id)
    }

    fn expired_pending_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        (**self).expired_pending_orders(cutoff)
    }

    fn insert_project(&self, project: &Project) -> StoreResult<()> {
        (**self).insert_project(project)
    }

    fn insert_units(&self, units: &[Unit]) -> StoreResult<()> {
        (**self).insert_units(units)
    }

    fn set_project_status(
        &self,
        project_id: ProjectId,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> StoreResult<Project> {
        (**self).set_project_status(project_id, from, to)
    }

    fn reserve_units(&self, project_id: ProjectId, count: u32) -> StoreResult<()> {
        (**self).reserve_units(project_id, count)
    }

    fn release_pool(&self, project_id: ProjectId, count: u32) -> StoreResult<()> {
        (**self).release_pool(project_id, count)
    }

    fn create_order(&self, order: &Order) -> StoreResult<()> {
        (**self).create_order(order)
    }

    fn mark_paid(&self, order_id: OrderId, stamp: &PaymentStamp) -> StoreResult<PaidOutcome> {
        (**self).mark_paid(order_id, stamp)
    }

    fn cancel_order(&self, order_id: OrderId) -> StoreResult<Order> {
        (**self).cancel_order(order_id)
    }

    fn complete_order(&self, order_id: OrderId) -> StoreResult<Order> {
        (**self).complete_order(order_id)
    }

    fn request_refund(&self, order_id: OrderId) -> StoreResult<Order> {
        (**self).request_refund(order_id)
    }

    fn settle_refund(&self, order_id: OrderId, approved: bool) -> StoreResult<Order> {
        (**self).settle_refund(order_id, approved)
    }

    fn allocate_units(&self, project_id: ProjectId, count: u32) -> StoreResult<Vec<UnitId>> {
        (**self).allocate_units(project_id, count)
    }

    fn release_units(&self, unit_ids: &[UnitId]) -> StoreResult<()> {
        (**self).release_units(unit_ids)
    }

    fn advance_units(
        &self,
        unit_ids: &[UnitId],
        from: UnitStatus,
        to: UnitStatus,
    ) -> StoreResult<()> {
        (**self).advance_units(unit_ids, from, to)
    }

    fn advance_records(
        &self,
        record_ids: &[RecordId],
        target: RecordStatus,
        now: DateTime<Utc>,
        outcome: Option<&HarvestOutcome>,
    ) -> StoreResult<usize> {
        (**self).advance_records(record_ids, target, now, outcome)
    }
}
