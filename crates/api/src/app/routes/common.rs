use axum::http::StatusCode;

use cropshare_infra::StoreError;

use crate::app::errors;

/// Run a sync service call on the blocking pool and map failures to HTTP
/// responses. The blocking pool also provides the runtime context the
/// Postgres store's sync bridge needs.
pub async fn blocking<T, F>(f: F) -> Result<T, axum::response::Response>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(errors::store_error_to_response(err)),
        Err(join_err) => Err(errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            join_err.to_string(),
        )),
    }
}
