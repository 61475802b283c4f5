use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cropshare_fulfillment::{Record, RecordStatus};
use cropshare_orders::{Order, OrderStatus};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub project_id: String,
    pub unit_count: u32,
    pub remark: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PayOrderRequest {
    pub method: String,
    pub payment_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRefundRequest {
    pub approved: bool,
    pub remark: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackVerifyRequest {
    pub order_no: String,
    pub payment_ref: String,
    /// Amount in the smallest currency unit; must equal the order's
    /// `actual_amount` exactly.
    pub amount: u64,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_no: String,
    pub user_id: String,
    pub project_id: String,
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
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            order_no: order.order_no,
            user_id: order.user_id.to_string(),
            project_id: order.project_id.to_string(),
            unit_count: order.unit_count,
            unit_price: order.unit_price,
            total_amount: order.total_amount,
            discount_amount: order.discount_amount,
            actual_amount: order.actual_amount,
            status: order.status,
            payment_method: order.payment_method,
            payment_no: order.payment_no,
            payment_time: order.payment_time,
            remark: order.remark,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub id: String,
    pub order_id: String,
    pub user_id: String,
    pub project_id: String,
    pub unit_id: String,
    pub status: RecordStatus,
    pub adoption_date: DateTime<Utc>,
    pub planting_date: Option<DateTime<Utc>>,
    pub harvest_date: Option<DateTime<Utc>>,
    pub actual_yield: Option<u64>,
    pub quality_grade: Option<String>,
}

impl From<Record> for RecordResponse {
    fn from(record: Record) -> Self {
        Self {
            id: record.id.to_string(),
            order_id: record.order_id.to_string(),
            user_id: record.user_id.to_string(),
            project_id: record.project_id.to_string(),
            unit_id: record.unit_id.to_string(),
            status: record.status,
            adoption_date: record.adoption_date,
            planting_date: record.planting_date,
            harvest_date: record.harvest_date,
            actual_yield: record.actual_yield,
            quality_grade: record.quality_grade,
        }
    }
}
