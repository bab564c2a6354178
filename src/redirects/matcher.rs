//! Ordered redirect rule matching.
//!
//! # Responsibilities
//! - Evaluate rules in declaration order, first match wins
//! - Apply host, path and condition checks
//! - Honour the force marker against existing static assets
//! - Turn the winning rule into a routing decision
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Unforced rules are shadowed by an asset at the request path
//! - A failed role requirement on a matching path denies the request
//!   instead of falling through to later rules

use axum::http::StatusCode;

use crate::conditions::{check, ConditionOutcome, RequestFacts};
use crate::redirects::rule::RedirectRule;

/// What the router should do with a matched rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    /// Respond with a 3xx and a `Location` header.
    Redirect { status: StatusCode, location: String },
    /// Serve `target` (path or absolute URL) with `status`.
    Rewrite { status: StatusCode, target: String },
    /// Respond with a bare status.
    Status(StatusCode),
    /// Continue routing the original path unchanged.
    PassThrough,
    /// A role requirement was not met: respond 404.
    Deny,
}

/// The winning rule and its decision.
#[derive(Debug, Clone)]
pub struct RedirectMatch<'a> {
    pub index: usize,
    pub rule: &'a RedirectRule,
    pub decision: RedirectDecision,
}

/// Request attributes a rule is matched against.
#[derive(Debug, Clone, Copy)]
pub struct RedirectRequest<'a> {
    pub host: Option<&'a str>,
    pub path: &'a str,
    pub facts: &'a RequestFacts,
}

/// Evaluates an ordered rule list.
#[derive(Debug, Clone, Default)]
pub struct RedirectMatcher {
    rules: Vec<RedirectRule>,
}

impl RedirectMatcher {
    pub fn new(rules: Vec<RedirectRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RedirectRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the first applicable rule.
    ///
    /// `asset_exists` answers whether a static asset would serve `path`;
    /// it is only consulted for unforced rules whose pattern matched.
    pub fn match_request<F>(&self, request: &RedirectRequest<'_>, asset_exists: F) -> Option<RedirectMatch<'_>>
    where
        F: Fn(&str) -> bool,
    {
        for (index, rule) in self.rules.iter().enumerate() {
            if let Some(host) = &rule.host {
                if !crate::routing::matcher::host_matches(host, request.host) {
                    continue;
                }
            }

            let Some(params) = rule.from.captures(request.path) else {
                continue;
            };

            if !rule.status.force && asset_exists(request.path) {
                tracing::trace!(rule = index, path = %request.path, "Rule shadowed by static asset");
                continue;
            }

            if let Some(condition) = &rule.condition {
                match check(condition, request.facts) {
                    ConditionOutcome::Met => {}
                    ConditionOutcome::RoleDenied => {
                        tracing::debug!(rule = index, path = %request.path, "Role condition not met, denying");
                        return Some(RedirectMatch {
                            index,
                            rule,
                            decision: RedirectDecision::Deny,
                        });
                    }
                    ConditionOutcome::CountryMismatch => continue,
                }
            }

            let decision = decide(rule, rule.target(&params));
            tracing::debug!(rule = index, from = %rule.from.as_str(), status = %rule.status, "Redirect rule matched");
            return Some(RedirectMatch { index, rule, decision });
        }
        None
    }
}

fn decide(rule: &RedirectRule, target: String) -> RedirectDecision {
    let status = StatusCode::from_u16(rule.status.code).unwrap_or(StatusCode::MOVED_PERMANENTLY);
    if target.is_empty() {
        return if status == StatusCode::OK {
            RedirectDecision::PassThrough
        } else {
            RedirectDecision::Status(status)
        };
    }
    if rule.status.is_redirect() {
        RedirectDecision::Redirect {
            status,
            location: target,
        }
    } else {
        RedirectDecision::Rewrite { status, target }
    }
}
