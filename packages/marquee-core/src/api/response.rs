//! JSON response helpers.
//!
//! Every API response is `{"success": true, "data": ...}` on the happy
//! path; error responses are produced by `SignageError::into_response`
//! with the same `success` discriminator.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// A `{"success": true, "data": ...}` response.
pub fn api_data<T: Serialize>(data: T) -> Response {
    Json(json!({ "success": true, "data": data })).into_response()
}

/// A bare `{"success": true}` acknowledgement.
pub fn api_ok() -> Response {
    Json(json!({ "success": true })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes() {
        let response = api_data(json!({"id": "x"}));
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let response = api_ok();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
