use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use cropshare_core::DomainError;
use cropshare_infra::StoreError;

/// Map a service failure to an HTTP response.
pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Domain(domain) => domain_error_to_response(domain),
        StoreError::Storage(msg) => {
            tracing::error!(%msg, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DomainError::PermissionDenied => {
            json_error(StatusCode::FORBIDDEN, "permission_denied", "permission denied")
        }
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::InvalidStateTransition(msg) => {
            json_error(StatusCode::CONFLICT, "invalid_state_transition", msg)
        }
        DomainError::InsufficientInventory(msg) => {
            json_error(StatusCode::CONFLICT, "insufficient_inventory", msg)
        }
        DomainError::PaymentMismatch(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "payment_mismatch", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
