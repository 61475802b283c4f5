use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use cropshare_core::RecordId;

use crate::app::routes::common::blocking;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new().route("/records/:id", get(get_record))
}

pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let record_id: RecordId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid record id")
        }
    };

    match blocking(move || services.tracker.record(record_id)).await {
        Ok(Some(record)) if record.user_id == user.user_id() => {
            Json(dto::RecordResponse::from(record)).into_response()
        }
        Ok(Some(_)) => {
            errors::json_error(StatusCode::FORBIDDEN, "permission_denied", "permission denied")
        }
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        Err(resp) => resp,
    }
}
