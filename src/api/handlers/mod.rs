pub mod accounts;
pub mod health;
pub mod login;
pub mod token_details;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

/// 500 for failures that happen before anything reaches the upstream.
pub(crate) fn internal_error(cause: &dyn std::fmt::Display) -> Response {
    error!("Failed to prepare upstream request: {}", cause);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Internal Server Error" })),
    )
        .into_response()
}
