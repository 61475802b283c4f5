use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use cropshare_core::{DomainError, DomainResult, Entity, OrderId, ProjectId, UserId};
use cropshare_inventory::Project;

/// Order lifecycle status.
///
/// The transitions form a directed graph, not an ordered sequence: the one
/// backward edge is `Refunded -> Paid`, taken when a refund request is
/// rejected. Do not replace `can_transition_to` with an ordering comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Legal edges of the order state graph.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        matches!(
            (self, target),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Paid, OrderStatus::Completed)
                | (OrderStatus::Paid, OrderStatus::Refunded)
                | (OrderStatus::Refunded, OrderStatus::Paid)
        )
    }
}

/// Payment details stamped onto an order when it is marked paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStamp {
    pub method: String,
    /// External payment reference (gateway transaction id).
    pub payment_no: String,
    pub paid_at: DateTime<Utc>,
}

/// A user's reservation/purchase intent for a number of units.
///
/// Monetary amounts are in the smallest currency unit and satisfy
/// `actual_amount = total_amount - discount_amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_no: String,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub unit_count: u32,
    pub unit_price: u64,
    pub total_amount: u64,
    pub discount_amount: u64,
    pub actual_amount: u64,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    pub payment_no: Option<String>,
    pub payment_time: Option<DateTime<Utc>>,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
}

impl Order {
    /// Build a new Pending order against an `Adopting` project.
    ///
    /// Runs the pure admission check (status + availability) and computes
    /// the monetary fields. The race-safe counter decrement is the storage
    /// layer's job; this only rejects requests that are already hopeless.
    pub fn create(
        user_id: UserId,
        project: &Project,
        unit_count: u32,
        discount_amount: u64,
        remark: Option<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Order> {
        project.check_reserve(unit_count)?;

        let total_amount = project
            .unit_price
            .checked_mul(u64::from(unit_count))
            .ok_or_else(|| DomainError::validation("order amount overflows"))?;
        if discount_amount > total_amount {
            return Err(DomainError::validation(
                "discount_amount cannot exceed total_amount",
            ));
        }

        Ok(Order {
            id: OrderId::new(),
            order_no: generate_order_no(created_at),
            user_id,
            project_id: project.id,
            unit_count,
            unit_price: project.unit_price,
            total_amount,
            discount_amount,
            actual_amount: total_amount - discount_amount,
            status: OrderStatus::Pending,
            payment_method: None,
            payment_no: None,
            payment_time: None,
            remark,
            created_at,
            deleted: false,
        })
    }

    /// Guard for a status change along the order graph.
    pub fn check_transition(&self, target: OrderStatus) -> DomainResult<()> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(format!(
                "order {} cannot move {:?} -> {:?}",
                self.order_no, self.status, target
            )))
        }
    }

    /// Read-only payment-callback integrity check.
    ///
    /// The order must still be Pending and the callback amount must equal
    /// `actual_amount` exactly. This never mutates state; a separate
    /// `pay_order` call performs the transition.
    pub fn verify_callback(&self, payment_no: &str, amount: u64) -> DomainResult<()> {
        if payment_no.trim().is_empty() {
            return Err(DomainError::validation("payment_no cannot be empty"));
        }
        if self.status != OrderStatus::Pending {
            return Err(DomainError::payment_mismatch(format!(
                "order {} is not pending (status: {:?})",
                self.order_no, self.status
            )));
        }
        if amount != self.actual_amount {
            return Err(DomainError::payment_mismatch(format!(
                "callback amount {amount} does not match actual amount {}",
                self.actual_amount
            )));
        }
        Ok(())
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Generate an order number: `"AD"` + `yyyyMMddHHmmss` + 4 random digits.
///
/// Best-effort uniqueness only. Two orders created within the same second
/// can collide; known weakness, kept for wire compatibility.
pub fn generate_order_no(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("AD{}{:04}", now.format("%Y%m%d%H%M%S"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropshare_inventory::ProjectStatus;

    fn adopting_project(total: u32, unit_price: u64) -> Project {
        let mut p =
            Project::new(ProjectId::new(), "rice paddy", total, unit_price, Utc::now()).unwrap();
        p.status = ProjectStatus::Adopting;
        p
    }

    fn pending_order(unit_count: u32) -> Order {
        let project = adopting_project(100, 1500);
        Order::create(UserId::new(), &project, unit_count, 0, None, Utc::now()).unwrap()
    }

    #[test]
    fn create_computes_amounts() {
        let project = adopting_project(100, 1500);
        let order = Order::create(
            UserId::new(),
            &project,
            10,
            500,
            Some("gift".to_string()),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, 15_000);
        assert_eq!(order.discount_amount, 500);
        assert_eq!(order.actual_amount, 14_500);
        assert_eq!(order.actual_amount, order.total_amount - order.discount_amount);
    }

    #[test]
    fn create_rejects_discount_above_total() {
        let project = adopting_project(100, 100);
        let err =
            Order::create(UserId::new(), &project, 1, 200, None, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_fails_when_project_not_adopting() {
        let mut project = adopting_project(100, 100);
        project.status = ProjectStatus::Completed;
        let err = Order::create(UserId::new(), &project, 1, 0, None, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition(_)));
    }

    #[test]
    fn state_graph_edges() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Completed));
        assert!(Paid.can_transition_to(Refunded));
        // The one backward edge: a rejected refund request reverts to Paid.
        assert!(Refunded.can_transition_to(Paid));

        assert!(!Cancelled.can_transition_to(Paid));
        assert!(!Completed.can_transition_to(Refunded));
        assert!(!Refunded.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Refunded));
    }

    #[test]
    fn pay_on_cancelled_order_is_rejected() {
        let mut order = pending_order(2);
        order.status = OrderStatus::Cancelled;
        let err = order.check_transition(OrderStatus::Paid).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition(_)));
    }

    #[test]
    fn order_no_has_prefix_timestamp_and_suffix() {
        let now = Utc::now();
        let no = generate_order_no(now);
        assert_eq!(no.len(), 2 + 14 + 4);
        assert!(no.starts_with("AD"));
        assert!(no[2..].chars().all(|c| c.is_ascii_digit()));
        assert!(no.starts_with(&format!("AD{}", now.format("%Y%m%d%H%M%S"))));
    }

    #[test]
    fn order_nos_within_one_second_share_the_timestamp_prefix() {
        // Documented weakness: only the 4 trailing digits differ within a
        // second, so collisions are possible. Not asserted against.
        let now = Utc::now();
        let a = generate_order_no(now);
        let b = generate_order_no(now);
        assert_eq!(a[..16], b[..16]);
    }

    #[test]
    fn verify_callback_checks_status_and_amount() {
        let order = pending_order(2);

        assert!(order.verify_callback("PAY-123", order.actual_amount).is_ok());
        assert!(matches!(
            order.verify_callback("PAY-123", order.actual_amount + 1),
            Err(DomainError::PaymentMismatch(_))
        ));
        assert!(matches!(
            order.verify_callback("", order.actual_amount),
            Err(DomainError::Validation(_))
        ));

        let mut paid = order;
        paid.status = OrderStatus::Paid;
        assert!(matches!(
            paid.verify_callback("PAY-123", paid.actual_amount),
            Err(DomainError::PaymentMismatch(_))
        ));
    }

    proptest::proptest! {
        /// The order number is always `AD` + 14 timestamp digits + 4
        /// random digits, regardless of when it is generated.
        #[test]
        fn order_no_shape_is_stable(secs in 0i64..4_000_000_000) {
            let when = chrono::DateTime::from_timestamp(secs, 0).unwrap();
            let no = generate_order_no(when);
            proptest::prop_assert_eq!(no.len(), 20);
            proptest::prop_assert!(no.starts_with("AD"));
            proptest::prop_assert!(no[2..].bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
