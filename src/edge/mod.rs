//! Edge function execution.
//!
//! # Data Flow
//! ```text
//! Router (edge_functions stage)
//!     → chain.rs   resolve_chain: bindings matching the path, in order
//!     → context.rs RequestContext: request id, identity, geo, site, env
//!     → sandbox.rs Sandbox::execute per binding
//!         handler returns Response       → done
//!         handler returns Rewrite / Url  → Downstream::reroute or proxy
//!         handler calls Next::run        → next binding, then Downstream::resume
//!         handler fails                  → onError: fail | bypass | fallback
//!     → cancel.rs  request and per-invocation cancellation
//! ```
//!
//! # Design Decisions
//! - One deadline for the whole chain, not one per binding
//! - Continuations are values; the chain never re-enters the router directly
//! - Environment views are computed per request from shared sources

pub mod cancel;
pub mod chain;
pub mod context;
pub mod env;
pub mod sandbox;

pub use cancel::Cancellation;
pub use chain::{resolve_chain, ChainParts, ChainState, Downstream, Next};
pub use context::{DeployInfo, Geo, RequestContext};
pub use env::{build_env_view, EnvNamespace, EnvSources, EnvViews};
pub use sandbox::{HandlerOutcome, HttpSandbox, Invocation, NativeSandbox, Sandbox, SandboxError};
