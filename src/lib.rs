//! Local edge router library.
//!
//! Routing core of a local edge development server: edge function chains,
//! conditional redirects, manifests and import maps, hot reload.

// Configuration and sources
pub mod config;
pub mod manifest;
pub mod redirects;
pub mod registry;
pub mod site;

// Request handling
pub mod conditions;
pub mod edge;
pub mod http;
pub mod origin;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::DevConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use registry::{Registry, RegistryHandle};
pub use routing::Router;
