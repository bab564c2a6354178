//! Request handling and transformation.
//!
//! # Responsibilities
//! - Name the request ID header carried by every response
//! - Extract routing-relevant information (host, path)
//! - Copy and rewrite buffered requests for rewrites and retries
//!
//! # Design Decisions
//! - Request ID is assigned by the outermost middleware layer
//! - Rewrites replace path and query only; method, headers and body travel
//!   unchanged

use std::str::FromStr;

use axum::http::uri::PathAndQuery;
use axum::http::{header, HeaderName, Request, Uri};

use crate::http::EdgeRequest;

/// Request ID header.
pub const X_NF_REQUEST_ID: &str = "x-nf-request-id";

/// Header name for the request ID layers.
pub fn request_id_header() -> HeaderName {
    HeaderName::from_static(X_NF_REQUEST_ID)
}

/// Request ID assigned by the middleware, if any.
pub fn request_id<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(X_NF_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Host the request was addressed to.
pub fn request_host<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
}

/// Duplicate a buffered request. Extensions are not copied.
pub fn clone_request(request: &EdgeRequest) -> EdgeRequest {
    let mut copy = Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}

/// Point `request` at `target` (a path, optionally with a query).
///
/// The original query string is kept when `target` carries none.
pub fn rewrite_path(mut request: EdgeRequest, target: &str) -> Result<EdgeRequest, axum::http::Error> {
    let path_and_query = match (target.contains('?'), request.uri().query()) {
        (false, Some(query)) => PathAndQuery::from_str(&format!("{}?{}", target, query))?,
        _ => PathAndQuery::from_str(target)?,
    };
    let mut parts = request.uri().clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    *request.uri_mut() = Uri::from_parts(parts)?;
    Ok(request)
}

/// Point `request` at an absolute URL.
pub fn retarget(mut request: EdgeRequest, url: &str) -> Result<EdgeRequest, axum::http::Error> {
    let uri = Uri::from_str(url)?;
    if let Some(authority) = uri.authority() {
        let host = axum::http::HeaderValue::from_str(authority.as_str())?;
        request.headers_mut().insert(header::HOST, host);
    }
    *request.uri_mut() = uri;
    Ok(request)
}
