//! Orders domain module.
//!
//! This crate contains business rules for reservation orders: the
//! payment/cancellation state machine, monetary computations, and
//! order-number generation. Pure deterministic domain logic, no IO.

pub mod order;

pub use order::{generate_order_no, Order, OrderStatus, PaymentStamp};
