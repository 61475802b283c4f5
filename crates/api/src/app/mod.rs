//! HTTP application wiring (axum router + service wiring).
//!
//! - `services.rs`: store selection and service construction
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs and JSON mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, routing::post, Extension, Router};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app() -> Router {
    let services = Arc::new(services::build_services().await);
    build_app_with(services)
}

/// Router over pre-built services; lets tests inject an in-memory world.
pub fn build_app_with(services: Arc<services::AppServices>) -> Router {
    // Order and record routes require an authenticated user.
    let protected = routes::router()
        .layer(Extension(services.clone()))
        .layer(axum::middleware::from_fn(
            middleware::user_context_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/payments/callback/verify",
            post(routes::payments::verify_callback),
        )
        .layer(Extension(services))
        .merge(protected)
}
