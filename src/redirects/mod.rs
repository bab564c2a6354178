//! Redirect subsystem.
//!
//! # Data Flow
//! ```text
//! [[redirects]] in netlify.toml   _redirects in publish dir
//!     → rule.rs (RedirectConfig → RedirectRule)   parser.rs (lines → RedirectRule)
//!     → config rules first, file rules after
//!     → matcher.rs (RedirectMatcher, part of the registry snapshot)
//!
//! Per request:
//!     host + path + RequestFacts
//!     → first matching rule
//!     → RedirectDecision (redirect | rewrite | status | pass-through | deny)
//! ```
//!
//! # Design Decisions
//! - Ordering is significant; rules are never re-sorted
//! - Parsing is strict: one bad line rejects the whole file

pub mod matcher;
pub mod parser;
pub mod rule;

use std::path::Path;

pub use matcher::{RedirectDecision, RedirectMatch, RedirectMatcher, RedirectRequest};
pub use parser::{load_redirects_file, parse_redirects};
pub use rule::{RedirectConfig, RedirectParseError, RedirectRule, RedirectStatus};

/// Build the ordered rule list: configuration rules, then the `_redirects` file.
pub fn load_rules(configured: &[RedirectConfig], redirects_file: &Path) -> Result<Vec<RedirectRule>, RedirectParseError> {
    let mut rules = configured
        .iter()
        .map(RedirectConfig::to_rule)
        .collect::<Result<Vec<_>, _>>()?;
    rules.extend(load_redirects_file(redirects_file)?);
    Ok(rules)
}
