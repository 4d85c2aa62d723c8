use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::AppResult;

pub fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// 404 for a missing `what`.
pub fn sorry(what: &str) -> AppResult<Response> {
    Ok(error(StatusCode::NOT_FOUND, format!("{what} not found")))
}

pub fn unauthenticated() -> AppResult<Response> {
    Ok(error(StatusCode::UNAUTHORIZED, "Not signed in"))
}

pub fn bad_request(message: impl Into<String>) -> AppResult<Response> {
    Ok(error(StatusCode::BAD_REQUEST, message))
}
