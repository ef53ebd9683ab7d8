//! Handler-level errors (spec.md §6): produced while parsing the incoming
//! request, before a `RetryExecutor` attempt loop ever starts. Kept as a
//! small reusable `status + body` shape rather than an error enum per call
//! site, matching `gproxy-core::error`'s flat `ProxyError`.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::StatusCode;

#[derive(Debug)]
pub struct ProxyError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ProxyError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::json(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::json(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    fn json(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        let body = serde_json::json!({ "error": { "code": code, "message": message.into() } });
        Self {
            status,
            body: Bytes::from(serde_json::to_vec(&body).unwrap_or_default()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        Response::builder()
            .status(self.status)
            .header("content-type", "application/json")
            .body(Body::from(self.body))
            .expect("status and header are statically valid")
    }
}
