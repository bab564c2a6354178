//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Map the configured level and `--debug` onto an env filter
//!
//! # Design Decisions
//! - `RUST_LOG` wins over configuration when set
//! - Debug mode also raises the level of HTTP middleware spans

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives for a log level.
pub fn directives(level: &str, debug: bool) -> String {
    if debug {
        "edge_router=debug,tower_http=debug".to_string()
    } else {
        format!("edge_router={},tower_http={}", level, level)
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(level: &str, debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| directives(level, debug).into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_overrides_level() {
        assert_eq!(directives("warn", false), "edge_router=warn,tower_http=warn");
        assert_eq!(directives("warn", true), "edge_router=debug,tower_http=debug");
    }
}
