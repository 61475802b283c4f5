use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, Json};

use crate::app::routes::common::blocking;
use crate::app::services::AppServices;
use crate::app::dto;

/// Read-only gateway-callback verification. Unauthenticated: the caller is
/// the payment gateway, not a user.
pub async fn verify_callback(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CallbackVerifyRequest>,
) -> axum::response::Response {
    match blocking(move || {
        services
            .ledger
            .verify_payment_callback(&body.order_no, &body.payment_ref, body.amount)
    })
    .await
    {
        Ok(order) => Json(serde_json::json!({
            "verified": true,
            "order_no": order.order_no,
        }))
        .into_response(),
        Err(resp) => resp,
    }
}
