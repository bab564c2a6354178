//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Router, edge chain, registry watcher produce:
//!     → logging.rs (structured log events, request id fields)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, opt-in)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line of a request
//! - Metrics are cheap when no exporter is installed

pub mod logging;
pub mod metrics;
