use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tilestock_infra::StockError;

pub fn stock_error_to_response(err: StockError) -> axum::response::Response {
    let status = match &err {
        StockError::NotFound(_) => StatusCode::NOT_FOUND,
        StockError::InsufficientStock { .. } => StatusCode::CONFLICT,
        StockError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StockError::Validation(_) => StatusCode::BAD_REQUEST,
        StockError::VersionConflict(_) | StockError::ConcurrentUpdateFailure { .. } => {
            StatusCode::CONFLICT
        }
        StockError::TransactionFailure(_) => {
            tracing::error!(error = %err, "stock transaction failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, err.code(), err.user_message())
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

/// Parse a path or query identifier, answering 400 on garbage.
pub fn parse_id<T: FromStr>(raw: &str, what: &'static str) -> Result<T, axum::response::Response> {
    raw.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}
