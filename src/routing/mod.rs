//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, headers, cookies)
//!     → router.rs (context, registry snapshot, pipeline)
//!         edge_functions → edge::chain (onion of bindings)
//!         redirects      → redirects::matcher (first match wins)
//!         origin         → origin::Origin (static files, framework)
//!     → Return: EdgeResponse, or 404 when no stage answered
//!
//! Pattern Compilation (at registry build):
//!     path / excludedPath / redirect `from`
//!     → matcher.rs (RoutePattern, named params, splats)
//! ```
//!
//! # Design Decisions
//! - One registry snapshot per request, even across rewrites
//! - Rewrite hops bounded per request
//! - Deterministic: same input and snapshot always route the same way

pub mod matcher;
pub mod router;

pub use router::{RouteError, Router};
