//! Common types used throughout the protection pipeline.
//!
//! Requests carry a buffered [`Bytes`] body because the CSRF guard has to
//! inspect JSON bodies for the double-submit token; responses use a
//! `Full<Bytes>` body.

use bytes::Bytes;
use http_body_util::Full;

/// The HTTP request type used in the protection pipeline.
///
/// The body is fully buffered before the pipeline runs.
pub type Request = http::Request<Bytes>;

/// The HTTP response type used in the protection pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// Extension trait for building JSON error responses.
///
/// Rejection bodies are the flat `{"error": "..."}` shape clients already
/// depend on, not a nested envelope.
pub trait ResponseExt {
    /// Creates a JSON error response with body `{"error": message}`.
    fn json_error(status: http::StatusCode, message: &str) -> Response;

    /// Creates a JSON response from an arbitrary value.
    fn json(status: http::StatusCode, body: &serde_json::Value) -> Response;
}

impl ResponseExt for Response {
    fn json_error(status: http::StatusCode, message: &str) -> Response {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    fn json(status: http::StatusCode, body: &serde_json::Value) -> Response {
        http::Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .expect("failed to build JSON response")
    }
}
