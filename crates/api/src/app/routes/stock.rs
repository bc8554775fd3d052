use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use tilestock_core::{LocationId, MovementId, ProductId};
use tilestock_infra::{InventoryService, ReceiveBatch, Transfer};

use crate::app::{blocking, dto, errors};

fn record_path(
    location: &str,
    product: &str,
) -> Result<(LocationId, ProductId), axum::response::Response> {
    Ok((
        errors::parse_id(location, "location")?,
        errors::parse_id(product, "product")?,
    ))
}

fn optional_location(
    raw: Option<&str>,
) -> Result<Option<LocationId>, axum::response::Response> {
    raw.map(|l| errors::parse_id(l, "location")).transpose()
}

pub async fn get_availability(
    Extension(service): Extension<InventoryService>,
    Path(product): Path<String>,
    Query(query): Query<dto::LocationQuery>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let location_id = match optional_location(query.location.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| svc.get_availability(product_id, location_id)).await {
        Ok(levels) => (StatusCode::OK, Json(levels)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_record(
    Extension(service): Extension<InventoryService>,
    Path((location, product)): Path<(String, String)>,
) -> axum::response::Response {
    let (location_id, product_id) = match record_path(&location, &product) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| svc.record(product_id, location_id)).await {
        Ok(record) => (StatusCode::OK, Json(dto::record_to_json(&record))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn stock_location(
    Extension(service): Extension<InventoryService>,
    Path((location, product)): Path<(String, String)>,
    Json(body): Json<dto::StockLocationRequest>,
) -> axum::response::Response {
    let (location_id, product_id) = match record_path(&location, &product) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = blocking(service, move |svc| {
        svc.stock_location(
            product_id,
            location_id,
            body.thresholds(),
            body.initial_quantity,
            body.actor,
        )
    })
    .await;
    match result {
        Ok(record) => (StatusCode::CREATED, Json(dto::record_to_json(&record))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn set_thresholds(
    Extension(service): Extension<InventoryService>,
    Path((location, product)): Path<(String, String)>,
    Json(body): Json<tilestock_inventory::StockThresholds>,
) -> axum::response::Response {
    let (location_id, product_id) = match record_path(&location, &product) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| {
        svc.set_thresholds(product_id, location_id, body)
    })
    .await
    {
        Ok(record) => (StatusCode::OK, Json(dto::record_to_json(&record))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn adjust_stock(
    Extension(service): Extension<InventoryService>,
    Path((location, product)): Path<(String, String)>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    let (location_id, product_id) = match record_path(&location, &product) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let adjustment = body.into_adjustment(product_id, location_id);

    match blocking(service, move |svc| svc.apply_adjustment(adjustment)).await {
        Ok(record) => (StatusCode::OK, Json(dto::record_to_json(&record))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn record_count(
    Extension(service): Extension<InventoryService>,
    Path((location, product)): Path<(String, String)>,
    Json(body): Json<dto::CountRequest>,
) -> axum::response::Response {
    let (location_id, product_id) = match record_path(&location, &product) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| {
        svc.record_count(product_id, location_id, body.counted, body.actor, body.notes)
    })
    .await
    {
        Ok(record) => (StatusCode::OK, Json(dto::record_to_json(&record))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn list_batches(
    Extension(service): Extension<InventoryService>,
    Path((location, product)): Path<(String, String)>,
) -> axum::response::Response {
    let (location_id, product_id) = match record_path(&location, &product) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| svc.batches(product_id, location_id)).await {
        Ok(batches) => (StatusCode::OK, Json(batches)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn receive_batch(
    Extension(service): Extension<InventoryService>,
    Path((location, product)): Path<(String, String)>,
    Json(body): Json<dto::ReceiveBatchRequest>,
) -> axum::response::Response {
    let (location_id, product_id) = match record_path(&location, &product) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let receipt = ReceiveBatch {
        product_id,
        location_id,
        batch_number: body.batch_number,
        quantity: body.quantity,
        unit_cost: body.unit_cost,
        expiry_date: body.expiry_date,
        actor: body.actor,
    };

    match blocking(service, move |svc| svc.receive_batch(receipt)).await {
        Ok(batch) => (StatusCode::CREATED, Json(batch)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn verify_ledger(
    Extension(service): Extension<InventoryService>,
    Path((location, product)): Path<(String, String)>,
) -> axum::response::Response {
    let (location_id, product_id) = match record_path(&location, &product) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| svc.verify_ledger(product_id, location_id)).await {
        Ok(audit) => (StatusCode::OK, Json(dto::audit_to_json(&audit))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn transfer(
    Extension(service): Extension<InventoryService>,
    Json(body): Json<dto::TransferRequest>,
) -> axum::response::Response {
    let transfer = Transfer {
        product_id: body.product_id,
        from: body.from,
        to: body.to,
        quantity: body.quantity,
        actor: body.actor,
        notes: body.notes,
    };

    match blocking(service, move |svc| svc.transfer(transfer)).await {
        Ok((from, to)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "from": dto::record_to_json(&from),
                "to": dto::record_to_json(&to),
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

pub async fn movement_history(
    Extension(service): Extension<InventoryService>,
    Path(product): Path<String>,
    Query(query): Query<dto::HistoryQuery>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let location_id = match optional_location(query.location.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| {
        svc.get_movement_history(product_id, location_id, query.limit)
    })
    .await
    {
        Ok(movements) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "count": movements.len(),
                "movements": movements,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

pub async fn record_pending(
    Extension(service): Extension<InventoryService>,
    Json(body): Json<dto::PendingMovementRequest>,
) -> axum::response::Response {
    let adjustment = body.into_adjustment();
    match blocking(service, move |svc| svc.record_pending(adjustment)).await {
        Ok(movement) => (StatusCode::CREATED, Json(movement)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn receive_pending(
    Extension(service): Extension<InventoryService>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let movement_id: MovementId = match errors::parse_id(&id, "movement") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| svc.receive_pending(movement_id)).await {
        Ok(record) => (StatusCode::OK, Json(dto::record_to_json(&record))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn cancel_pending(
    Extension(service): Extension<InventoryService>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let movement_id: MovementId = match errors::parse_id(&id, "movement") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(service, move |svc| svc.cancel_pending(movement_id)).await {
        Ok(movement) => (StatusCode::OK, Json(movement)).into_response(),
        Err(resp) => resp,
    }
}
