//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, trace, timeout)
//!     → body buffered into EdgeRequest
//!     → routing::Router
//!     → response.rs (EdgeResponse back into an axum body)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - Bodies are buffered so edge functions can read and replace them
//! - `x-nf-request-id` is set once at the edge and reused downstream

use axum::http::{Request, Response};
use bytes::Bytes;

pub mod request;
pub mod response;
pub mod server;

/// A request with a fully buffered body.
pub type EdgeRequest = Request<Bytes>;

/// A response with a fully buffered body.
pub type EdgeResponse = Response<Bytes>;

pub use request::X_NF_REQUEST_ID;
pub use server::HttpServer;
