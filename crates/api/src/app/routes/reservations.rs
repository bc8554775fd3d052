use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use tilestock_core::{CartSessionId, ReservationId};
use tilestock_infra::InventoryService;
use tilestock_inventory::ReservationHolder;

use crate::app::{blocking, dto, errors};

fn session_id(raw: &str) -> Result<CartSessionId, axum::response::Response> {
    errors::parse_id(raw, "session")
}

pub async fn reserve(
    Extension(service): Extension<InventoryService>,
    Json(body): Json<dto::ReserveRequest>,
) -> axum::response::Response {
    let session = match session_id(&body.session_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ttl = body.ttl();
    let holder = ReservationHolder::cart(session)
        .with_user(body.user_id)
        .with_order(body.order_id)
        .with_unit_price(body.unit_price);

    match blocking(service, move |svc| {
        svc.reserve(body.product_id, body.location_id, body.quantity, holder, ttl)
    })
    .await
    {
        Ok(reservation) => (StatusCode::CREATED, Json(reservation)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_reservation(
    Extension(service): Extension<InventoryService>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let reservation_id: ReservationId = match errors::parse_id(&id, "reservation") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| svc.get_reservation(reservation_id)).await {
        Ok(reservation) => (StatusCode::OK, Json(reservation)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn confirm(
    Extension(service): Extension<InventoryService>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let reservation_id: ReservationId = match errors::parse_id(&id, "reservation") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| svc.confirm_reservation(reservation_id)).await {
        Ok(reservation) => (StatusCode::OK, Json(reservation)).into_response(),
        Err(resp) => resp,
    }
}

/// Idempotent: releasing a terminal reservation answers 200 with
/// `"released": false`.
pub async fn release(
    Extension(service): Extension<InventoryService>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let reservation_id: ReservationId = match errors::parse_id(&id, "reservation") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| svc.release_cart_reservation(reservation_id)).await {
        Ok(outcome) => (StatusCode::OK, Json(dto::release_to_json(&outcome))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn session_reservations(
    Extension(service): Extension<InventoryService>,
    Path(session): Path<String>,
) -> axum::response::Response {
    let session = match session_id(&session) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| svc.reservations_for_session(&session)).await {
        Ok(reservations) => (StatusCode::OK, Json(reservations)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn sync_session(
    Extension(service): Extension<InventoryService>,
    Path(session): Path<String>,
) -> axum::response::Response {
    let session = match session_id(&session) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let echoed = session.clone();

    match blocking(service, move |svc| svc.sync_for_session(&session)).await {
        Ok(active) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "session_id": echoed,
                "active": active,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}
