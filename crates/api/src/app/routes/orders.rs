use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use cropshare_core::{OrderId, ProjectId};

use crate::app::routes::common::blocking;
use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new().nest("/orders", orders_router())
}

fn orders_router() -> Router {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/pay", post(pay_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/refund", post(apply_refund))
        .route("/:id/refund/process", post(process_refund))
        .route("/:id/complete", post(complete_order))
        .route("/:id/records", get(order_records))
}

fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id")
    })
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let project_id: ProjectId = match body.project_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid project id")
        }
    };

    let order = match blocking(move || {
        services
            .ledger
            .create_order(user.user_id(), project_id, body.unit_count, body.remark)
    })
    .await
    {
        Ok(order) => order,
        Err(resp) => return resp,
    };

    (StatusCode::CREATED, Json(dto::OrderResponse::from(order))).into_response()
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let order = match blocking(move || services.ledger.order(order_id)).await {
        Ok(Some(order)) => order,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        Err(resp) => return resp,
    };
    if order.user_id != user.user_id() {
        return errors::json_error(StatusCode::FORBIDDEN, "permission_denied", "permission denied");
    }

    Json(dto::OrderResponse::from(order)).into_response()
}

pub async fn pay_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::PayOrderRequest>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let outcome = match blocking(move || {
        services
            .ledger
            .pay_order(order_id, body.method, body.payment_ref)
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(resp) => return resp,
    };

    let records: Vec<dto::RecordResponse> = outcome
        .records
        .into_iter()
        .map(dto::RecordResponse::from)
        .collect();
    Json(serde_json::json!({
        "order": dto::OrderResponse::from(outcome.order),
        "records": records,
    }))
    .into_response()
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(move || services.ledger.cancel_order(order_id, user.user_id())).await {
        Ok(order) => Json(dto::OrderResponse::from(order)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn apply_refund(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RefundRequest>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(move || {
        services
            .ledger
            .apply_refund(order_id, user.user_id(), body.reason)
    })
    .await
    {
        Ok(order) => Json(dto::OrderResponse::from(order)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn process_refund(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ProcessRefundRequest>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(move || {
        services
            .ledger
            .process_refund(order_id, body.approved, body.remark)
    })
    .await
    {
        Ok(order) => Json(dto::OrderResponse::from(order)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn complete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(move || services.ledger.complete_order(order_id)).await {
        Ok(order) => Json(dto::OrderResponse::from(order)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn order_records(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(move || services.tracker.records_for_order(order_id)).await {
        Ok(records) => {
            let records: Vec<dto::RecordResponse> =
                records.into_iter().map(dto::RecordResponse::from).collect();
            Json(records).into_response()
        }
        Err(resp) => resp,
    }
}
