//! Condition evaluation subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (cookies, headers) + server-start overrides
//!     → identity.rs (verify signed claims → roles)
//!     → country.rs (override → cookie → default)
//!     → RequestFacts (computed once per request)
//!     → evaluate_role / evaluate_country (pure predicates)
//! ```
//!
//! # Design Decisions
//! - Evaluation never fails: missing or invalid signals mean "not met"
//! - Facts are derived once per request and reused by every rule

pub mod country;
pub mod identity;

use std::collections::BTreeSet;

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

pub use country::{CountryResolver, DEFAULT_COUNTRY};
pub use identity::{Identity, IdentityDecoder};

/// Predicate attached to a redirect rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Any of these roles grants a match. Empty = no role requirement.
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Any of these country codes grants a match. Empty = no requirement.
    #[serde(default)]
    pub countries: BTreeSet<String>,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.countries.is_empty()
    }
}

/// Request-derived facts the predicates run against.
#[derive(Debug, Clone)]
pub struct RequestFacts {
    pub identity: Option<Identity>,
    pub country: String,
}

/// Bundles the decoders configured at server start.
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    identity: IdentityDecoder,
    country: CountryResolver,
}

impl ConditionEvaluator {
    pub fn new(identity: IdentityDecoder, country: CountryResolver) -> Self {
        Self { identity, country }
    }

    /// Derive the facts of one request.
    pub fn facts(&self, headers: &HeaderMap) -> RequestFacts {
        RequestFacts {
            identity: self.identity.from_headers(headers),
            country: self.country.resolve(headers),
        }
    }
}

/// Outcome of checking a rule's condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOutcome {
    Met,
    /// A role requirement was not satisfied.
    RoleDenied,
    /// A country requirement was not satisfied.
    CountryMismatch,
}

/// Check `condition` against `facts`.
pub fn check(condition: &Condition, facts: &RequestFacts) -> ConditionOutcome {
    if !condition.roles.is_empty() && !evaluate_role(facts.identity.as_ref(), &condition.roles) {
        return ConditionOutcome::RoleDenied;
    }
    if !condition.countries.is_empty() && !evaluate_country(&facts.country, &condition.countries) {
        return ConditionOutcome::CountryMismatch;
    }
    ConditionOutcome::Met
}

/// True if a verified identity carries one of `required` roles.
pub fn evaluate_role(identity: Option<&Identity>, required: &BTreeSet<String>) -> bool {
    identity
        .map(|id| id.roles.iter().any(|r| required.contains(r)))
        .unwrap_or(false)
}

/// True if `resolved` is one of `required` (codes are stored uppercase).
pub fn evaluate_country(resolved: &str, required: &BTreeSet<String>) -> bool {
    required.contains(&resolved.to_ascii_uppercase())
}

/// Value of cookie `name` across all `Cookie` headers.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"').to_string())
}
