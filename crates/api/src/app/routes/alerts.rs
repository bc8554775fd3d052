use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use tilestock_core::AlertId;
use tilestock_infra::InventoryService;

use crate::app::{blocking, dto, errors};

pub async fn active_alerts(
    Extension(service): Extension<InventoryService>,
) -> axum::response::Response {
    match blocking(service, |svc| svc.get_active_alerts()).await {
        Ok(alerts) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "count": alerts.len(),
                "alerts": alerts,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

pub async fn acknowledge(
    Extension(service): Extension<InventoryService>,
    Path(id): Path<String>,
    body: Option<Json<dto::AcknowledgeRequest>>,
) -> axum::response::Response {
    let alert_id: AlertId = match errors::parse_id(&id, "alert") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let actor = body.and_then(|Json(b)| b.actor);

    match blocking(service, move |svc| svc.acknowledge_alert(alert_id, actor)).await {
        Ok(alert) => (StatusCode::OK, Json(alert)).into_response(),
        Err(resp) => resp,
    }
}
