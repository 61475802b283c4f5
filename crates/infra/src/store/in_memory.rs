use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use cropshare_core::{DomainError, OrderId, ProjectId, RecordId, UnitId};
use cropshare_fulfillment::{HarvestOutcome, Record, RecordStatus};
use cropshare_inventory::{Project, ProjectStatus, Unit, UnitStatus};
use cropshare_orders::{Order, OrderStatus, PaymentStamp};

use super::r#trait::{AdoptionStore, PaidOutcome, StoreError, StoreResult};

#[derive(Debug, Default, Clone)]
struct Tables {
    projects: HashMap<ProjectId, Project>,
    units: HashMap<UnitId, Unit>,
    orders: HashMap<OrderId, Order>,
    records: HashMap<RecordId, Record>,
}

/// In-memory adoption store.
///
/// Intended for tests/dev. A single mutex over the four tables makes every
/// compound operation trivially transactional: operations run against a
/// working copy and commit by swap, so a failure midway leaves nothing
/// behind. The mutex also serializes the counter decrement, satisfying the
/// conditional-update contract.
#[derive(Debug, Default)]
pub struct InMemoryAdoptionStore {
    tables: Mutex<Tables>,
}

impl InMemoryAdoptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against a working copy of the tables; commit on success,
    /// discard on error.
    fn transact<R>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<R>) -> StoreResult<R> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        let mut work = guard.clone();
        let out = f(&mut work)?;
        *guard = work;
        Ok(out)
    }

    /// Overwrite an order row directly, bypassing the status guards. Lets
    /// tests backdate `created_at`.
    #[cfg(test)]
    pub(crate) fn put_order_for_test(&self, order: Order) {
        let mut guard = self.tables.lock().unwrap();
        guard.orders.insert(order.id, order);
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> StoreResult<R> {
        let guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        Ok(f(&guard))
    }
}

fn live_order(tables: &Tables, id: OrderId) -> StoreResult<Order> {
    tables
        .orders
        .get(&id)
        .filter(|o| !o.deleted)
        .cloned()
        .ok_or(StoreError::Domain(DomainError::NotFound))
}

fn reserve_in(tables: &mut Tables, project_id: ProjectId, count: u32) -> StoreResult<()> {
    let project = tables
        .projects
        .get_mut(&project_id)
        .filter(|p| !p.deleted)
        .ok_or(StoreError::Domain(DomainError::NotFound))?;

    if project.status != ProjectStatus::Adopting {
        return Err(DomainError::invalid_transition(format!(
            "project is not open for adoption (status: {:?})",
            project.status
        ))
        .into());
    }
    if project.available_units < count {
        return Err(DomainError::insufficient(format!(
            "requested {count} units, {} available",
            project.available_units
        ))
        .into());
    }
    project.available_units -= count;
    Ok(())
}

fn release_in(tables: &mut Tables, project_id: ProjectId, count: u32) -> StoreResult<()> {
    let project = tables
        .projects
        .get_mut(&project_id)
        .filter(|p| !p.deleted)
        .ok_or(StoreError::Domain(DomainError::NotFound))?;
    project.available_units += count;
    Ok(())
}

/// Conditional status flip: succeeds only if the order is currently `from`.
fn flip_order_status(
    tables: &mut Tables,
    id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
) -> StoreResult<Order> {
    let order = tables
        .orders
        .get_mut(&id)
        .filter(|o| !o.deleted)
        .ok_or(StoreError::Domain(DomainError::NotFound))?;
    if order.status != from {
        return Err(DomainError::invalid_transition(format!(
            "order {} cannot move {:?} -> {:?}",
            order.order_no, order.status, to
        ))
        .into());
    }
    order.status = to;
    Ok(order.clone())
}

fn allocate_in(tables: &mut Tables, project_id: ProjectId, count: u32) -> StoreResult<Vec<UnitId>> {
    let mut available: Vec<&Unit> = tables
        .units
        .values()
        .filter(|u| u.project_id == project_id && !u.deleted && u.status == UnitStatus::Available)
        .collect();
    available.sort_by_key(|u| u.unit_number);

    if (available.len() as u32) < count {
        return Err(DomainError::insufficient(format!(
            "allocation needs {count} units, {} available",
            available.len()
        ))
        .into());
    }

    let ids: Vec<UnitId> = available
        .into_iter()
        .take(count as usize)
        .map(|u| u.id)
        .collect();
    for id in &ids {
        if let Some(u) = tables.units.get_mut(id) {
            u.status = UnitStatus::Adopted;
        }
    }
    Ok(ids)
}

/// Whether every unit of the order's live records is still Adopted, i.e.
/// the order's refund intent has not been settled.
fn units_of_order_adopted(tables: &Tables, order_id: OrderId) -> bool {
    tables
        .records
        .values()
        .filter(|r| r.order_id == order_id && !r.deleted)
        .all(|r| {
            tables
                .units
                .get(&r.unit_id)
                .is_some_and(|u| u.status == UnitStatus::Adopted)
        })
}

fn release_units_in(tables: &mut Tables, unit_ids: &[UnitId]) -> StoreResult<()> {
    // Validate the whole batch first so a failure releases nothing.
    for id in unit_ids {
        let unit = tables
            .units
            .get(id)
            .filter(|u| !u.deleted)
            .ok_or(StoreError::Domain(DomainError::NotFound))?;
        if !unit.status.releasable() {
            return Err(DomainError::invalid_transition(format!(
                "unit {} is {:?}, only adopted units can be released",
                unit.unit_number, unit.status
            ))
            .into());
        }
    }
    for id in unit_ids {
        if let Some(u) = tables.units.get_mut(id) {
            u.status = UnitStatus::Available;
        }
    }
    Ok(())
}

impl AdoptionStore for InMemoryAdoptionStore {
    fn project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        self.read(|t| t.projects.get(&id).filter(|p| !p.deleted).cloned())
    }

    fn order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        self.read(|t| t.orders.get(&id).filter(|o| !o.deleted).cloned())
    }

    fn order_by_no(&self, order_no: &str) -> StoreResult<Option<Order>> {
        self.read(|t| {
            t.orders
                .values()
                .find(|o| o.order_no == order_no && !o.deleted)
                .cloned()
        })
    }

    fn record(&self, id: RecordId) -> StoreResult<Option<Record>> {
        self.read(|t| t.records.get(&id).filter(|r| !r.deleted).cloned())
    }

    fn records_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Record>> {
        self.read(|t| {
            let mut records: Vec<Record> = t
                .records
                .values()
                .filter(|r| r.order_id == order_id && !r.deleted)
                .cloned()
                .collect();
            records.sort_by_key(|r| *r.id.as_uuid());
            records
        })
    }

    fn unit(&self, id: UnitId) -> StoreResult<Option<Unit>> {
        self.read(|t| t.units.get(&id).filter(|u| !u.deleted).cloned())
    }

    fn units_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Unit>> {
        self.read(|t| {
            let mut units: Vec<Unit> = t
                .units
                .values()
                .filter(|u| u.project_id == project_id && !u.deleted)
                .cloned()
                .collect();
            units.sort_by_key(|u| u.unit_number);
            units
        })
    }

    fn expired_pending_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        self.read(|t| {
            let mut orders: Vec<Order> = t
                .orders
                .values()
                .filter(|o| {
                    !o.deleted && o.status == OrderStatus::Pending && o.created_at < cutoff
                })
                .cloned()
                .collect();
            orders.sort_by_key(|o| o.created_at);
            orders
        })
    }

    fn insert_project(&self, project: &Project) -> StoreResult<()> {
        self.transact(|t| {
            if t.projects.contains_key(&project.id) {
                return Err(StoreError::storage(format!(
                    "project {} already exists",
                    project.id
                )));
            }
            t.projects.insert(project.id, project.clone());
            Ok(())
        })
    }

    fn insert_units(&self, units: &[Unit]) -> StoreResult<()> {
        self.transact(|t| {
            for unit in units {
                if t.units.contains_key(&unit.id) {
                    return Err(StoreError::storage(format!(
                        "unit {} already exists",
                        unit.id
                    )));
                }
                t.units.insert(unit.id, unit.clone());
            }
            Ok(())
        })
    }

    fn set_project_status(
        &self,
        project_id: ProjectId,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> StoreResult<Project> {
        self.transact(|t| {
            let project = t
                .projects
                .get_mut(&project_id)
                .filter(|p| !p.deleted)
                .ok_or(StoreError::Domain(DomainError::NotFound))?;
            if project.status != from {
                return Err(DomainError::invalid_transition(format!(
                    "project cannot move {:?} -> {to:?}",
                    project.status
                ))
                .into());
            }
            project.status = to;
            Ok(project.clone())
        })
    }

    fn reserve_units(&self, project_id: ProjectId, count: u32) -> StoreResult<()> {
        self.transact(|t| reserve_in(t, project_id, count))
    }

    fn release_pool(&self, project_id: ProjectId, count: u32) -> StoreResult<()> {
        self.transact(|t| release_in(t, project_id, count))
    }

    fn create_order(&self, order: &Order) -> StoreResult<()> {
        self.transact(|t| {
            if t.orders.contains_key(&order.id) {
                return Err(StoreError::storage(format!(
                    "order {} already exists",
                    order.id
                )));
            }
            reserve_in(t, order.project_id, order.unit_count)?;
            t.orders.insert(order.id, order.clone());
            Ok(())
        })
    }

    fn mark_paid(&self, order_id: OrderId, stamp: &PaymentStamp) -> StoreResult<PaidOutcome> {
        self.transact(|t| {
            let pending = live_order(t, order_id)?;
            flip_order_status(t, order_id, OrderStatus::Pending, OrderStatus::Paid)?;

            let unit_ids = allocate_in(t, pending.project_id, pending.unit_count)?;

            let mut records = Vec::with_capacity(unit_ids.len());
            for unit_id in unit_ids {
                let record = Record::adopted(
                    order_id,
                    pending.user_id,
                    pending.project_id,
                    unit_id,
                    stamp.paid_at,
                );
                t.records.insert(record.id, record.clone());
                records.push(record);
            }

            let order = t
                .orders
                .get_mut(&order_id)
                .ok_or(StoreError::Domain(DomainError::NotFound))?;
            order.payment_method = Some(stamp.method.clone());
            order.payment_no = Some(stamp.payment_no.clone());
            order.payment_time = Some(stamp.paid_at);

            Ok(PaidOutcome {
                order: order.clone(),
                records,
            })
        })
    }

    fn cancel_order(&self, order_id: OrderId) -> StoreResult<Order> {
        self.transact(|t| {
            let order = flip_order_status(t, order_id, OrderStatus::Pending, OrderStatus::Cancelled)?;
            release_in(t, order.project_id, order.unit_count)?;
            Ok(order)
        })
    }

    fn complete_order(&self, order_id: OrderId) -> StoreResult<Order> {
        self.transact(|t| flip_order_status(t, order_id, OrderStatus::Paid, OrderStatus::Completed))
    }

    fn request_refund(&self, order_id: OrderId) -> StoreResult<Order> {
        self.transact(|t| flip_order_status(t, order_id, OrderStatus::Paid, OrderStatus::Refunded))
    }

    fn settle_refund(&self, order_id: OrderId, approved: bool) -> StoreResult<Order> {
        self.transact(|t| {
            if !approved {
                // Rejected refund request: the one backward edge. The edge
                // only exists while the refund is an unsettled intent; once
                // an approval has released the units, the settlement stands.
                let order = live_order(t, order_id)?;
                if order.status == OrderStatus::Refunded && !units_of_order_adopted(t, order_id) {
                    return Err(DomainError::invalid_transition(
                        "refund was already settled, cannot revert to paid",
                    )
                    .into());
                }
                return flip_order_status(t, order_id, OrderStatus::Refunded, OrderStatus::Paid);
            }

            let order = live_order(t, order_id)?;
            if order.status != OrderStatus::Refunded {
                return Err(DomainError::invalid_transition(format!(
                    "order {} has no refund to settle (status: {:?})",
                    order.order_no, order.status
                ))
                .into());
            }

            let unit_ids: Vec<UnitId> = t
                .records
                .values()
                .filter(|r| r.order_id == order_id && !r.deleted)
                .map(|r| r.unit_id)
                .collect();

            // Fails if any unit already moved past Adopted, which also
            // makes a double-approval impossible: released units are
            // Available and no longer releasable.
            release_units_in(t, &unit_ids)?;
            release_in(t, order.project_id, order.unit_count)?;

            // Records are retained as historical artifacts.
            live_order(t, order_id)
        })
    }

    fn allocate_units(&self, project_id: ProjectId, count: u32) -> StoreResult<Vec<UnitId>> {
        self.transact(|t| allocate_in(t, project_id, count))
    }

    fn release_units(&self, unit_ids: &[UnitId]) -> StoreResult<()> {
        self.transact(|t| release_units_in(t, unit_ids))
    }

    fn advance_units(
        &self,
        unit_ids: &[UnitId],
        from: UnitStatus,
        to: UnitStatus,
    ) -> StoreResult<()> {
        if !from.can_advance_to(to) {
            return Err(DomainError::invalid_transition(format!(
                "units cannot move {from:?} -> {to:?}"
            ))
            .into());
        }
        self.transact(|t| {
            for id in unit_ids {
                let unit = t
                    .units
                    .get(id)
                    .filter(|u| !u.deleted)
                    .ok_or(StoreError::Domain(DomainError::NotFound))?;
                if unit.status != from {
                    return Err(DomainError::invalid_transition(format!(
                        "unit {} is {:?}, expected {:?}",
                        unit.unit_number, unit.status, from
                    ))
                    .into());
                }
            }
            for id in unit_ids {
                if let Some(u) = t.units.get_mut(id) {
                    u.status = to;
                }
            }
            Ok(())
        })
    }

    fn advance_records(
        &self,
        record_ids: &[RecordId],
        target: RecordStatus,
        now: DateTime<Utc>,
        outcome: Option<&HarvestOutcome>,
    ) -> StoreResult<usize> {
        if target == RecordStatus::Harvested && outcome.is_none() {
            return Err(
                DomainError::validation("harvest outcome is required for Harvested").into(),
            );
        }
        self.transact(|t| {
            // Validate the whole batch before touching anything.
            let mut to_advance = Vec::new();
            for id in record_ids {
                let record = t
                    .records
                    .get(id)
                    .filter(|r| !r.deleted)
                    .ok_or(StoreError::Domain(DomainError::NotFound))?;
                if record.check_advance(target).map_err(StoreError::Domain)? {
                    to_advance.push(*id);
                }
            }

            for id in &to_advance {
                if let Some(record) = t.records.get_mut(id) {
                    match (target, outcome) {
                        (RecordStatus::Harvested, Some(h)) => record.apply_harvest(h),
                        _ => record.apply_advance(target, now),
                    }
                }
            }
            Ok(to_advance.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropshare_core::UserId;

    fn seed_project(store: &InMemoryAdoptionStore, total: u32) -> Project {
        let mut project =
            Project::new(ProjectId::new(), "tea terrace", total, 1000, Utc::now()).unwrap();
        project.status = ProjectStatus::Adopting;
        store.insert_project(&project).unwrap();
        store.insert_units(&Unit::batch(project.id, total)).unwrap();
        project
    }

    fn pending_order(store: &InMemoryAdoptionStore, project: &Project, count: u32) -> Order {
        let order =
            Order::create(UserId::new(), project, count, 0, None, Utc::now()).unwrap();
        store.create_order(&order).unwrap();
        order
    }

    fn stamp() -> PaymentStamp {
        PaymentStamp {
            method: "wechat".to_string(),
            payment_no: "PAY-1".to_string(),
            paid_at: Utc::now(),
        }
    }

    #[test]
    fn reserve_decrements_only_when_satisfiable() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 5);

        store.reserve_units(project.id, 3).unwrap();
        assert_eq!(store.project(project.id).unwrap().unwrap().available_units, 2);

        let err = store.reserve_units(project.id, 3).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InsufficientInventory(_))
        ));
        // Failed reserve leaves the counter untouched.
        assert_eq!(store.project(project.id).unwrap().unwrap().available_units, 2);
    }

    #[test]
    fn create_order_is_atomic_with_the_reservation() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 10);

        let order = pending_order(&store, &project, 4);
        assert_eq!(store.project(project.id).unwrap().unwrap().available_units, 6);
        assert_eq!(store.order(order.id).unwrap().unwrap().status, OrderStatus::Pending);

        // A second order that overshoots fails and inserts nothing.
        let mut refreshed = store.project(project.id).unwrap().unwrap();
        refreshed.status = ProjectStatus::Adopting;
        let too_big = Order::create(UserId::new(), &refreshed, 6, 0, None, Utc::now()).unwrap();
        let mut hopeless = too_big.clone();
        hopeless.unit_count = 7;
        let err = store.create_order(&hopeless).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InsufficientInventory(_))
        ));
        assert!(store.order(hopeless.id).unwrap().is_none());
        assert_eq!(store.project(project.id).unwrap().unwrap().available_units, 6);
    }

    #[test]
    fn mark_paid_allocates_in_creation_order_and_creates_records() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 10);
        let order = pending_order(&store, &project, 3);

        let outcome = store.mark_paid(order.id, &stamp()).unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Paid);
        assert!(outcome.order.payment_time.is_some());
        assert_eq!(outcome.records.len(), 3);

        let units = store.units_for_project(project.id).unwrap();
        let adopted: Vec<u32> = units
            .iter()
            .filter(|u| u.status == UnitStatus::Adopted)
            .map(|u| u.unit_number)
            .collect();
        assert_eq!(adopted, vec![1, 2, 3]);
    }

    #[test]
    fn mark_paid_requires_pending() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 10);
        let order = pending_order(&store, &project, 2);

        store.cancel_order(order.id).unwrap();
        let err = store.mark_paid(order.id, &stamp()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InvalidStateTransition(_))
        ));
        // Nothing was allocated by the failed pay.
        let units = store.units_for_project(project.id).unwrap();
        assert!(units.iter().all(|u| u.status == UnitStatus::Available));
    }

    #[test]
    fn cancel_is_not_idempotent_and_never_double_releases() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 10);
        let order = pending_order(&store, &project, 4);

        store.cancel_order(order.id).unwrap();
        assert_eq!(store.project(project.id).unwrap().unwrap().available_units, 10);

        let err = store.cancel_order(order.id).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InvalidStateTransition(_))
        ));
        assert_eq!(store.project(project.id).unwrap().unwrap().available_units, 10);
    }

    #[test]
    fn settle_refund_rejection_takes_the_back_edge() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 10);
        let order = pending_order(&store, &project, 2);
        store.mark_paid(order.id, &stamp()).unwrap();
        store.request_refund(order.id).unwrap();

        let reverted = store.settle_refund(order.id, false).unwrap();
        assert_eq!(reverted.status, OrderStatus::Paid);
        // No inventory change on rejection.
        assert_eq!(store.project(project.id).unwrap().unwrap().available_units, 8);
    }

    #[test]
    fn settle_refund_approval_cannot_run_twice() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 10);
        let order = pending_order(&store, &project, 2);
        store.mark_paid(order.id, &stamp()).unwrap();
        store.request_refund(order.id).unwrap();

        store.settle_refund(order.id, true).unwrap();
        assert_eq!(store.project(project.id).unwrap().unwrap().available_units, 10);

        // Units are Available again, so a second approval fails whole.
        let err = store.settle_refund(order.id, true).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InvalidStateTransition(_))
        ));
        assert_eq!(store.project(project.id).unwrap().unwrap().available_units, 10);
    }

    #[test]
    fn settle_refund_rejection_after_approval_cannot_revert() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 10);
        let order = pending_order(&store, &project, 2);
        store.mark_paid(order.id, &stamp()).unwrap();
        store.request_refund(order.id).unwrap();

        store.settle_refund(order.id, true).unwrap();
        assert_eq!(store.project(project.id).unwrap().unwrap().available_units, 10);

        // The units were released, so the back-edge is gone: the order must
        // not come back Paid while its inventory sits in the pool.
        let err = store.settle_refund(order.id, false).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InvalidStateTransition(_))
        ));
        assert_eq!(
            store.order(order.id).unwrap().unwrap().status,
            OrderStatus::Refunded
        );
        assert_eq!(store.project(project.id).unwrap().unwrap().available_units, 10);
    }

    #[test]
    fn advance_units_is_all_or_nothing() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 5);
        let ids = store.allocate_units(project.id, 3).unwrap();

        // One unit dragged ahead out of band.
        store
            .advance_units(&ids[..1], UnitStatus::Adopted, UnitStatus::Planting)
            .unwrap();

        let err = store
            .advance_units(&ids, UnitStatus::Adopted, UnitStatus::Planting)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InvalidStateTransition(_))
        ));

        // The failed batch moved nothing: exactly one unit is Planting.
        let units = store.units_for_project(project.id).unwrap();
        let planting = units
            .iter()
            .filter(|u| u.status == UnitStatus::Planting)
            .count();
        assert_eq!(planting, 1);
    }

    #[test]
    fn advance_units_rejects_non_adjacent_jumps() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 5);
        let ids = store.allocate_units(project.id, 2).unwrap();

        let err = store
            .advance_units(&ids, UnitStatus::Adopted, UnitStatus::Harvested)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn advance_records_skips_noops_and_counts_advances() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 5);
        let order = pending_order(&store, &project, 2);
        let outcome = store.mark_paid(order.id, &stamp()).unwrap();
        let ids: Vec<RecordId> = outcome.records.iter().map(|r| r.id).collect();

        let advanced = store
            .advance_records(&ids, RecordStatus::Planting, Utc::now(), None)
            .unwrap();
        assert_eq!(advanced, 2);

        // Re-applying the same target is a no-op, not an error.
        let advanced = store
            .advance_records(&ids, RecordStatus::Planting, Utc::now(), None)
            .unwrap();
        assert_eq!(advanced, 0);

        // Skipping ahead fails.
        let err = store
            .advance_records(&ids, RecordStatus::Completed, Utc::now(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InvalidStateTransition(_))
        ));

        // Harvested requires an outcome to stamp.
        let err = store
            .advance_records(&ids, RecordStatus::Harvested, Utc::now(), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Validation(_))));
    }

    #[test]
    fn soft_deleted_rows_are_invisible_to_reads() {
        let store = InMemoryAdoptionStore::new();
        let project = seed_project(&store, 3);
        let order = pending_order(&store, &project, 1);

        {
            let mut guard = store.tables.lock().unwrap();
            guard.orders.get_mut(&order.id).unwrap().deleted = true;
        }

        assert!(store.order(order.id).unwrap().is_none());
        assert!(store.order_by_no(&order.order_no).unwrap().is_none());
        assert!(store
            .expired_pending_orders(Utc::now() + chrono::Duration::hours(1))
            .unwrap()
            .is_empty());
    }
}
