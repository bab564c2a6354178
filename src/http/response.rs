//! Response construction.
//!
//! # Responsibilities
//! - Build the plain responses the router produces itself
//! - Convert buffered responses for the HTTP server
//!
//! # Design Decisions
//! - Builders never fail: an unrepresentable header degrades to a 500

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use bytes::Bytes;

use crate::http::EdgeResponse;

/// Body of the final 404 when nothing served the request.
pub const NOT_FOUND_BODY: &str = "404 Not Found";

/// Body of the 404 served when a role requirement is not met.
pub const DENIED_BODY: &str = "Not Found";

/// Plain text response.
pub fn text(status: StatusCode, body: impl Into<String>) -> EdgeResponse {
    let mut response = Response::new(Bytes::from(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Empty response with `status`.
pub fn status(status: StatusCode) -> EdgeResponse {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

/// Redirect to `location`.
pub fn redirect(code: StatusCode, location: &str) -> EdgeResponse {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = status(code);
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(_) => text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("invalid redirect location `{}`", location),
        ),
    }
}

/// Final 404.
pub fn not_found() -> EdgeResponse {
    text(StatusCode::NOT_FOUND, NOT_FOUND_BODY)
}

/// 404 for a failed role condition.
pub fn denied() -> EdgeResponse {
    text(StatusCode::NOT_FOUND, DENIED_BODY)
}

/// Convert for the HTTP server.
pub fn into_axum(response: EdgeResponse) -> Response<Body> {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::from(body))
}
