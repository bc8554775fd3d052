//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request bodies and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use axum::response::Response;
use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use tilestock_infra::{InventoryService, StockError};

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(service: InventoryService) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(service)))
}

/// Run a stock operation on the blocking pool. Commits take a lock and
/// conflict retries sleep, so neither may run on an async worker.
pub(crate) async fn blocking<T, F>(service: InventoryService, op: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&InventoryService) -> Result<T, StockError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || op(&service)).await {
        Ok(result) => result.map_err(errors::stock_error_to_response),
        Err(join) => {
            tracing::error!(error = %join, "stock operation panicked");
            Err(errors::json_error(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            ))
        }
    }
}
