//! Origin: static assets and the framework dev server.
//!
//! # Data Flow
//! ```text
//! Router (origin stage, fallbacks, redirect shadowing)
//!     → Origin::asset_exists      (sync, for unforced redirect rules)
//!     → Origin::serve_static      (publish directory, pretty URLs)
//!     → Origin::proxy_to_framework
//!           relative URI → framework dev server (hyper-util client)
//!           absolute URI → external host (reqwest)
//! ```
//!
//! # Design Decisions
//! - Routing only sees the trait; the static server is one implementation
//! - Bodies are buffered so edge functions can read and rewrite them

pub mod mime;
pub mod static_files;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::{EdgeRequest, EdgeResponse};

pub use static_files::StaticOrigin;

/// Errors raised by an origin.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("no framework server configured")]
    NoFramework,

    #[error("invalid upstream address: {0}")]
    InvalidUri(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream response body: {0}")]
    Body(String),
}

/// Content served when no edge function or redirect answered.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Static asset for `path`, if one exists.
    async fn serve_static(&self, path: &str) -> Option<EdgeResponse>;

    /// Forward to the framework server, or to the absolute URL in the request.
    async fn proxy_to_framework(&self, request: EdgeRequest) -> Result<EdgeResponse, OriginError>;

    /// Whether a static asset would serve `path`.
    fn asset_exists(&self, path: &str) -> bool;
}
