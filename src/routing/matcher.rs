//! Path pattern matching.
//!
//! # Responsibilities
//! - Compile glob-style route patterns (`/blog/*`, `/:lang/about`)
//! - Match request paths and capture splat / placeholder values
//! - Match the host part of absolute-URL patterns
//!
//! # Design Decisions
//! - Host matching is case-insensitive, ports ignored
//! - Path matching is case-sensitive
//! - A trailing `/*` also matches the bare prefix (`/admin/*` matches `/admin`)
//! - A trailing slash on the request path is tolerated
//! - Patterns compile once into an anchored regex; matching never allocates
//!   unless captures are requested

use std::fmt;

use regex::Regex;
use thiserror::Error;

/// Errors raised while compiling a pattern.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern `{0}` must start with `/`")]
    NotAbsolute(String),

    #[error("pattern `{pattern}` declares placeholder `:{name}` twice")]
    DuplicatePlaceholder { pattern: String, name: String },

    #[error("pattern `{0}` could not be compiled: {1}")]
    Invalid(String, String),
}

/// Values captured by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A compiled route pattern.
#[derive(Clone)]
pub struct RoutePattern {
    source: String,
    regex: Regex,
}

impl fmt::Debug for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RoutePattern").field(&self.source).finish()
    }
}

impl PartialEq for RoutePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for RoutePattern {}

impl RoutePattern {
    /// Compile a pattern.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::NotAbsolute(pattern.to_string()));
        }

        let trimmed = if pattern.len() > 1 {
            pattern.trim_end_matches('/')
        } else {
            pattern
        };
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed };

        let chars: Vec<char> = trimmed.chars().collect();
        let mut re = String::from("^");
        let mut names: Vec<String> = Vec::new();
        let mut splat_used = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            // Trailing `/*`: the separator is optional so the bare prefix matches.
            if c == '/' && i + 2 == chars.len() && chars[i + 1] == '*' {
                if splat_used {
                    re.push_str("(?:/.*)?");
                } else {
                    re.push_str("(?:/(?P<splat>.*))?");
                    splat_used = true;
                }
                i += 2;
                continue;
            }

            match c {
                '*' => {
                    if splat_used {
                        re.push_str(".*");
                    } else {
                        re.push_str("(?P<splat>.*)");
                        splat_used = true;
                    }
                    i += 1;
                }
                ':' if i > 0 && chars[i - 1] == '/' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    let valid = name
                        .chars()
                        .next()
                        .map(|first| first.is_ascii_alphabetic() || first == '_')
                        .unwrap_or(false);
                    if !valid || name == "splat" {
                        re.push_str(&regex::escape(":"));
                        i += 1;
                        continue;
                    }
                    if names.contains(&name) {
                        return Err(PatternError::DuplicatePlaceholder {
                            pattern: pattern.to_string(),
                            name,
                        });
                    }
                    re.push_str(&format!("(?P<{}>[^/]+)", name));
                    names.push(name);
                    i = end;
                }
                _ => {
                    re.push_str(&regex::escape(&c.to_string()));
                    i += 1;
                }
            }
        }

        if !trimmed.ends_with('*') {
            re.push_str("/?");
        }
        re.push('$');

        let regex = Regex::new(&re).map_err(|e| PatternError::Invalid(pattern.to_string(), e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if `path` matches.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match `path` and return captured values.
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        let params = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Some(Params(params))
    }
}

/// Compare a request host against a rule host (case-insensitive, port ignored).
pub fn host_matches(expected: &str, actual: Option<&str>) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    strip_port(actual).eq_ignore_ascii_case(strip_port(expected))
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal: keep up to the closing bracket.
        return host.split_once(']').map(|(h, _)| &host[..h.len() + 1]).unwrap_or(host);
    }
    host.split_once(':').map(|(h, _)| h).unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pattern() {
        let p = RoutePattern::parse("/edge-function").unwrap();
        assert!(p.matches("/edge-function"));
        assert!(p.matches("/edge-function/"));
        assert!(!p.matches("/edge-function/more"));
        assert!(!p.matches("/Edge-Function"));
    }

    #[test]
    fn test_splat_matches_bare_prefix() {
        let p = RoutePattern::parse("/admin/*").unwrap();
        assert!(p.matches("/admin"));
        assert!(p.matches("/admin/"));
        assert!(p.matches("/admin/foo/bar"));
        assert!(!p.matches("/administrator"));

        let caps = p.captures("/admin/foo/bar").unwrap();
        assert_eq!(caps.get("splat"), Some("foo/bar"));
    }

    #[test]
    fn test_root_splat_matches_everything() {
        let p = RoutePattern::parse("/*").unwrap();
        assert!(p.matches("/"));
        assert!(p.matches("/foo"));
        assert!(p.matches("/static/foo"));
    }

    #[test]
    fn test_root_pattern() {
        let p = RoutePattern::parse("/").unwrap();
        assert!(p.matches("/"));
        assert!(!p.matches("/index.html"));
    }

    #[test]
    fn test_placeholders() {
        let p = RoutePattern::parse("/:lang/blog/:slug").unwrap();
        let caps = p.captures("/es/blog/hola").unwrap();
        assert_eq!(caps.get("lang"), Some("es"));
        assert_eq!(caps.get("slug"), Some("hola"));
        assert!(!p.matches("/es/blog"));
    }

    #[test]
    fn test_literal_characters_are_escaped() {
        let p = RoutePattern::parse("/file.html").unwrap();
        assert!(p.matches("/file.html"));
        assert!(!p.matches("/fileXhtml"));
    }

    #[test]
    fn test_rejects_relative_and_duplicate() {
        assert!(matches!(RoutePattern::parse("foo"), Err(PatternError::NotAbsolute(_))));
        assert!(matches!(
            RoutePattern::parse("/:a/:a"),
            Err(PatternError::DuplicatePlaceholder { .. })
        ));
    }

    #[test]
    fn test_host_matcher() {
        assert!(host_matches("localhost", Some("localhost:8888")));
        assert!(host_matches("example.com", Some("EXAMPLE.COM")));
        assert!(!host_matches("example.com", Some("other.com")));
        assert!(!host_matches("example.com", None));
    }
}
