use axum::Router;

pub mod common;
pub mod orders;
pub mod payments;
pub mod records;
pub mod system;

/// Routes that require an authenticated user.
pub fn router() -> Router {
    Router::new().merge(orders::router()).merge(records::router())
}
