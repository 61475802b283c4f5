//! Order lifecycle service.
//!
//! Drives the payment/cancellation state machine over the store's atomic
//! compound operations. Ownership checks live here; status guards live in
//! the store as conditional updates so racing actors (user vs. reaper,
//! double callbacks) resolve to exactly one winner.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use cropshare_core::{DomainError, OrderId, ProjectId, UserId};
use cropshare_fulfillment::Record;
use cropshare_inventory::Project;
use cropshare_orders::{Order, PaymentStamp};

use crate::store::{AdoptionStore, PaidOutcome, StoreResult};

/// Pricing hook applied at order creation.
///
/// Returns the discount in the smallest currency unit; it must not exceed
/// the order total (enforced again by `Order::create`).
pub trait DiscountPolicy: Send + Sync {
    fn discount_for(&self, project: &Project, unit_count: u32) -> u64;
}

/// Default policy: no discount.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscount;

impl DiscountPolicy for NoDiscount {
    fn discount_for(&self, _project: &Project, _unit_count: u32) -> u64 {
        0
    }
}

pub struct ReservationLedger<S: ?Sized> {
    store: Arc<S>,
    discount: Arc<dyn DiscountPolicy>,
}

impl<S: ?Sized> Clone for ReservationLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            discount: Arc::clone(&self.discount),
        }
    }
}

impl<S: AdoptionStore + ?Sized> ReservationLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_discount(store, Arc::new(NoDiscount))
    }

    pub fn with_discount(store: Arc<S>, discount: Arc<dyn DiscountPolicy>) -> Self {
        Self { store, discount }
    }

    pub fn order(&self, order_id: OrderId) -> StoreResult<Option<Order>> {
        self.store.order(order_id)
    }

    pub fn records_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Record>> {
        self.store.records_for_order(order_id)
    }

    /// Place a Pending order: reserves the pool counter and inserts the
    /// order in one transaction. No concrete units are chosen yet.
    pub fn create_order(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        unit_count: u32,
        remark: Option<String>,
    ) -> StoreResult<Order> {
        let project = self
            .store
            .project(project_id)?
            .ok_or(DomainError::NotFound)?;
        let discount = self.discount.discount_for(&project, unit_count);
        let order = Order::create(user_id, &project, unit_count, discount, remark, Utc::now())?;
        self.store.create_order(&order)?;
        info!(
            order_no = %order.order_no,
            %user_id,
            %project_id,
            unit_count,
            actual_amount = order.actual_amount,
            "order created"
        );
        Ok(order)
    }

    /// Owner-initiated cancellation of a Pending order; returns the
    /// reserved units to the pool.
    pub fn cancel_order(&self, order_id: OrderId, user_id: UserId) -> StoreResult<Order> {
        self.check_owner(order_id, user_id)?;
        let order = self.store.cancel_order(order_id)?;
        info!(order_no = %order.order_no, "order cancelled");
        Ok(order)
    }

    /// Confirm payment: Pending -> Paid, allocate the concrete units and
    /// open one fulfillment record per unit, all in one transaction.
    pub fn pay_order(
        &self,
        order_id: OrderId,
        method: impl Into<String>,
        payment_ref: impl Into<String>,
    ) -> StoreResult<PaidOutcome> {
        let method = method.into();
        let payment_ref = payment_ref.into();
        if method.trim().is_empty() || payment_ref.trim().is_empty() {
            return Err(
                DomainError::validation("payment method and reference are required").into(),
            );
        }
        let stamp = PaymentStamp {
            method,
            payment_no: payment_ref,
            paid_at: Utc::now(),
        };
        let outcome = self.store.mark_paid(order_id, &stamp)?;
        info!(
            order_no = %outcome.order.order_no,
            units = outcome.records.len(),
            "order paid, units allocated"
        );
        Ok(outcome)
    }

    /// Paid -> Completed, after fulfillment wraps up.
    pub fn complete_order(&self, order_id: OrderId) -> StoreResult<Order> {
        let order = self.store.complete_order(order_id)?;
        info!(order_no = %order.order_no, "order completed");
        Ok(order)
    }

    /// Owner-initiated refund request on a Paid order. Inventory is
    /// untouched until the request is settled.
    pub fn apply_refund(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: Option<String>,
    ) -> StoreResult<Order> {
        self.check_owner(order_id, user_id)?;
        let order = self.store.request_refund(order_id)?;
        info!(
            order_no = %order.order_no,
            reason = reason.as_deref().unwrap_or(""),
            "refund requested"
        );
        Ok(order)
    }

    /// Settle a refund request. Approved: the order's units and pool
    /// counter come back, fulfillment records stay for history. Rejected:
    /// the order takes the one backward edge, Refunded -> Paid.
    pub fn process_refund(
        &self,
        order_id: OrderId,
        approved: bool,
        remark: Option<String>,
    ) -> StoreResult<Order> {
        let order = self.store.settle_refund(order_id, approved)?;
        if approved {
            info!(
                order_no = %order.order_no,
                remark = remark.as_deref().unwrap_or(""),
                "refund approved, inventory released"
            );
        } else {
            warn!(
                order_no = %order.order_no,
                remark = remark.as_deref().unwrap_or(""),
                "refund rejected, order back to paid"
            );
        }
        Ok(order)
    }

    /// Read-only gateway-callback verification. A missing order number is
    /// reported as `PaymentMismatch` rather than `NotFound` so the gateway
    /// retries instead of giving up.
    pub fn verify_payment_callback(
        &self,
        order_no: &str,
        payment_ref: &str,
        amount: u64,
    ) -> StoreResult<Order> {
        let order = self.store.order_by_no(order_no)?.ok_or_else(|| {
            DomainError::payment_mismatch(format!("no order found for number {order_no}"))
        })?;
        order.verify_callback(payment_ref, amount)?;
        Ok(order)
    }

    fn check_owner(&self, order_id: OrderId, user_id: UserId) -> StoreResult<()> {
        let order = self.store.order(order_id)?.ok_or(DomainError::NotFound)?;
        if order.user_id != user_id {
            return Err(DomainError::PermissionDenied.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryAdoptionStore, StoreError};
    use crate::{InventoryPool, UnitRegistry};
    use cropshare_core::ProjectId;
    use cropshare_orders::OrderStatus;

    struct Harness {
        ledger: ReservationLedger<InMemoryAdoptionStore>,
        pool: InventoryPool<InMemoryAdoptionStore>,
        project_id: ProjectId,
        user: UserId,
    }

    fn harness(total: u32) -> Harness {
        let store = Arc::new(InMemoryAdoptionStore::new());
        let pool = InventoryPool::new(store.clone());
        let registry = UnitRegistry::new(store.clone());
        let project = pool.create_project("melon field", total, 2500).unwrap();
        registry.batch_create(project.id, total).unwrap();
        pool.open_adoption(project.id).unwrap();
        Harness {
            ledger: ReservationLedger::new(store),
            pool,
            project_id: project.id,
            user: UserId::new(),
        }
    }

    #[test]
    fn create_order_reserves_and_prices() {
        let h = harness(20);
        let order = h
            .ledger
            .create_order(h.user, h.project_id, 4, Some("gift".into()))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, 10_000);
        assert_eq!(order.actual_amount, 10_000);
        assert!(order.order_no.starts_with("AD"));
        assert_eq!(
            h.pool.project(h.project_id).unwrap().unwrap().available_units,
            16
        );
    }

    #[test]
    fn discount_policy_feeds_order_pricing() {
        struct TenPercent;
        impl DiscountPolicy for TenPercent {
            fn discount_for(&self, project: &Project, unit_count: u32) -> u64 {
                project.unit_price * u64::from(unit_count) / 10
            }
        }
        let h = harness(10);
        let ledger =
            ReservationLedger::with_discount(Arc::clone(&h.ledger.store), Arc::new(TenPercent));
        let order = ledger.create_order(h.user, h.project_id, 2, None).unwrap();
        assert_eq!(order.total_amount, 5_000);
        assert_eq!(order.discount_amount, 500);
        assert_eq!(order.actual_amount, 4_500);
    }

    #[test]
    fn cancel_is_owner_only() {
        let h = harness(10);
        let order = h.ledger.create_order(h.user, h.project_id, 2, None).unwrap();
        assert!(matches!(
            h.ledger.cancel_order(order.id, UserId::new()),
            Err(StoreError::Domain(DomainError::PermissionDenied))
        ));
        let cancelled = h.ledger.cancel_order(order.id, h.user).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(
            h.pool.project(h.project_id).unwrap().unwrap().available_units,
            10
        );
    }

    #[test]
    fn pay_allocates_units_and_records() {
        let h = harness(10);
        let order = h.ledger.create_order(h.user, h.project_id, 3, None).unwrap();
        let outcome = h.ledger.pay_order(order.id, "wechat", "WX-123").unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Paid);
        assert_eq!(outcome.order.payment_no.as_deref(), Some("WX-123"));
        assert_eq!(outcome.records.len(), 3);
        let records = h.ledger.records_for_order(order.id).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn pay_requires_method_and_reference() {
        let h = harness(10);
        let order = h.ledger.create_order(h.user, h.project_id, 1, None).unwrap();
        assert!(matches!(
            h.ledger.pay_order(order.id, "", "WX-1"),
            Err(StoreError::Domain(DomainError::Validation(_)))
        ));
        assert!(matches!(
            h.ledger.pay_order(order.id, "wechat", "  "),
            Err(StoreError::Domain(DomainError::Validation(_)))
        ));
    }

    #[test]
    fn refund_rejection_takes_the_back_edge() {
        let h = harness(10);
        let order = h.ledger.create_order(h.user, h.project_id, 2, None).unwrap();
        h.ledger.pay_order(order.id, "alipay", "AP-9").unwrap();
        h.ledger.apply_refund(order.id, h.user, Some("moved away".into())).unwrap();
        let back = h.ledger.process_refund(order.id, false, None).unwrap();
        assert_eq!(back.status, OrderStatus::Paid);
        // Inventory untouched by the rejected request.
        assert_eq!(
            h.pool.project(h.project_id).unwrap().unwrap().available_units,
            8
        );
    }

    #[test]
    fn refund_approval_releases_inventory_keeps_records() {
        let h = harness(10);
        let order = h.ledger.create_order(h.user, h.project_id, 2, None).unwrap();
        h.ledger.pay_order(order.id, "alipay", "AP-10").unwrap();
        h.ledger.apply_refund(order.id, h.user, None).unwrap();
        let settled = h.ledger.process_refund(order.id, true, None).unwrap();
        assert_eq!(settled.status, OrderStatus::Refunded);
        assert_eq!(
            h.pool.project(h.project_id).unwrap().unwrap().available_units,
            10
        );
        assert_eq!(h.ledger.records_for_order(order.id).unwrap().len(), 2);
    }

    #[test]
    fn callback_verification_is_read_only_and_exact() {
        let h = harness(10);
        let order = h.ledger.create_order(h.user, h.project_id, 2, None).unwrap();

        assert!(matches!(
            h.ledger
                .verify_payment_callback("AD00000000000000xxxx", "WX-1", order.actual_amount),
            Err(StoreError::Domain(DomainError::PaymentMismatch(_)))
        ));
        assert!(matches!(
            h.ledger
                .verify_payment_callback(&order.order_no, "WX-1", order.actual_amount + 1),
            Err(StoreError::Domain(DomainError::PaymentMismatch(_)))
        ));

        let verified = h
            .ledger
            .verify_payment_callback(&order.order_no, "WX-1", order.actual_amount)
            .unwrap();
        // Verification never mutates.
        assert_eq!(verified.status, OrderStatus::Pending);
        assert_eq!(
            h.ledger.order(order.id).unwrap().unwrap().status,
            OrderStatus::Pending
        );
    }
}
