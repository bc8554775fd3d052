use axum::{
    routing::{get, post, put},
    Router,
};

pub mod alerts;
pub mod reservations;
pub mod stock;
pub mod system;

/// Router for every stock endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .route("/availability/:product", get(stock::get_availability))
        .route(
            "/locations/:location/products/:product",
            get(stock::get_record).post(stock::stock_location),
        )
        .route(
            "/locations/:location/products/:product/thresholds",
            put(stock::set_thresholds),
        )
        .route(
            "/locations/:location/products/:product/adjust",
            post(stock::adjust_stock),
        )
        .route(
            "/locations/:location/products/:product/count",
            post(stock::record_count),
        )
        .route(
            "/locations/:location/products/:product/batches",
            get(stock::list_batches).post(stock::receive_batch),
        )
        .route(
            "/locations/:location/products/:product/ledger",
            get(stock::verify_ledger),
        )
        .route("/transfers", post(stock::transfer))
        .route("/movements/:product", get(stock::movement_history))
        .route("/pending", post(stock::record_pending))
        .route("/pending/:id/receive", post(stock::receive_pending))
        .route("/pending/:id/cancel", post(stock::cancel_pending))
        .route("/reservations", post(reservations::reserve))
        .route("/reservations/:id", get(reservations::get_reservation))
        .route("/reservations/:id/confirm", post(reservations::confirm))
        .route("/reservations/:id/release", post(reservations::release))
        .route(
            "/sessions/:session/reservations",
            get(reservations::session_reservations),
        )
        .route("/sessions/:session/sync", post(reservations::sync_session))
        .route("/alerts", get(alerts::active_alerts))
        .route("/alerts/:id/acknowledge", post(alerts::acknowledge))
}
