//! `{"message", "data"}` response envelope used by every JSON route.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Response body.
#[derive(Clone, Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    /// Human-readable summary.
    pub message: String,
    /// Route-specific payload.
    pub data: T,
}

fn respond<T: Serialize>(status: StatusCode, message: impl Into<String>, data: T) -> Response {
    (
        status,
        Json(Envelope {
            message: message.into(),
            data,
        }),
    )
        .into_response()
}

/// `200 OK`.
pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    respond(StatusCode::OK, message, data)
}

/// `404 Not Found`.
pub fn not_found<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    respond(StatusCode::NOT_FOUND, message, data)
}

/// `500 Internal Server Error` with no data.
pub fn internal_error(message: impl Into<String>) -> Response {
    respond(StatusCode::INTERNAL_SERVER_ERROR, message, serde_json::Value::Null)
}
