//! Redirect rule types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::conditions::Condition;
use crate::config::schema::OneOrMany;
use crate::routing::matcher::{Params, PatternError, RoutePattern};

/// Status used when a rule does not declare one.
pub const DEFAULT_STATUS: u16 = 301;

/// Errors raised while building redirect rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RedirectParseError {
    #[error("invalid status `{0}`")]
    Status(String),

    #[error("invalid source `{0}`")]
    Source(String),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("unsupported condition `{0}`")]
    Condition(String),

    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: Box<RedirectParseError>,
    },
}

/// Response status of a rule plus its force marker (`200!`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectStatus {
    pub code: u16,
    /// Apply even when a static asset exists at the source path.
    pub force: bool,
}

impl RedirectStatus {
    pub fn new(code: u16, force: bool) -> Result<Self, RedirectParseError> {
        if !(200..=599).contains(&code) {
            return Err(RedirectParseError::Status(code.to_string()));
        }
        Ok(Self { code, force })
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.code)
    }
}

impl Default for RedirectStatus {
    fn default() -> Self {
        Self {
            code: DEFAULT_STATUS,
            force: false,
        }
    }
}

impl FromStr for RedirectStatus {
    type Err = RedirectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (digits, force) = match s.strip_suffix('!') {
            Some(d) => (d, true),
            None => (s, false),
        };
        let code = digits
            .parse::<u16>()
            .map_err(|_| RedirectParseError::Status(s.to_string()))?;
        Self::new(code, force)
    }
}

impl fmt::Display for RedirectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.code, if self.force { "!" } else { "" })
    }
}

/// A declarative redirect, rewrite or status rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectRule {
    pub from: RoutePattern,
    /// Host the rule is restricted to (absolute-URL sources).
    pub host: Option<String>,
    /// Target path or URL. Empty = status control only.
    pub to: String,
    pub status: RedirectStatus,
    pub condition: Option<Condition>,
}

impl RedirectRule {
    pub fn new(
        from: &str,
        to: impl Into<String>,
        status: RedirectStatus,
        condition: Option<Condition>,
    ) -> Result<Self, RedirectParseError> {
        let (host, path) = split_source(from)?;
        Ok(Self {
            from: RoutePattern::parse(&path)?,
            host,
            to: to.into(),
            status,
            condition: condition.filter(|c| !c.is_empty()),
        })
    }

    /// Expand `:splat` and `:name` references in the target.
    pub fn target(&self, params: &Params) -> String {
        substitute(&self.to, params)
    }
}

fn split_source(from: &str) -> Result<(Option<String>, String), RedirectParseError> {
    if from.starts_with("http://") || from.starts_with("https://") {
        let url = Url::parse(from).map_err(|_| RedirectParseError::Source(from.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| RedirectParseError::Source(from.to_string()))?
            .to_string();
        Ok((Some(host), url.path().to_string()))
    } else {
        Ok((None, from.to_string()))
    }
}

fn substitute(template: &str, params: &Params) -> String {
    if params.is_empty() || !template.contains(':') {
        return template.to_string();
    }
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find(':') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..len];
        match params.get(name) {
            Some(value) if !name.is_empty() => out.push_str(value),
            _ => {
                out.push(':');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}

/// Parse a `Key=v1,v2` condition into `condition`.
pub(crate) fn apply_condition(
    condition: &mut Condition,
    key: &str,
    values: impl IntoIterator<Item = String>,
) -> Result<(), RedirectParseError> {
    let values = values.into_iter().map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    match key.to_ascii_lowercase().as_str() {
        "role" => condition.roles.extend(values),
        "country" => condition.countries.extend(values.map(|v| v.to_ascii_uppercase())),
        _ => return Err(RedirectParseError::Condition(key.to_string())),
    }
    Ok(())
}

/// A status written either as a number or as text (`"200!"`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StatusValue {
    Code(u16),
    Text(String),
}

/// A redirect rule as written in the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RedirectConfig {
    pub from: String,

    #[serde(default)]
    pub to: String,

    #[serde(default)]
    pub status: Option<StatusValue>,

    #[serde(default)]
    pub force: bool,

    #[serde(default)]
    pub conditions: BTreeMap<String, OneOrMany>,
}

impl RedirectConfig {
    pub fn to_rule(&self) -> Result<RedirectRule, RedirectParseError> {
        let mut status = match &self.status {
            None => RedirectStatus::default(),
            Some(StatusValue::Code(code)) => RedirectStatus::new(*code, false)?,
            Some(StatusValue::Text(text)) => text.parse()?,
        };
        status.force |= self.force;

        let mut condition = Condition::default();
        for (key, values) in &self.conditions {
            apply_condition(&mut condition, key, values.clone().into_vec())?;
        }

        RedirectRule::new(&self.from, self.to.clone(), status, Some(condition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!("200!".parse::<RedirectStatus>().unwrap(), RedirectStatus { code: 200, force: true });
        assert_eq!("302".parse::<RedirectStatus>().unwrap(), RedirectStatus { code: 302, force: false });
        assert!("abc".parse::<RedirectStatus>().is_err());
        assert!("100".parse::<RedirectStatus>().is_err());
    }

    #[test]
    fn test_absolute_source_keeps_host() {
        let rule = RedirectRule::new("http://localhost/hello-world", "/local-hello", RedirectStatus::new(200, false).unwrap(), None).unwrap();
        assert_eq!(rule.host.as_deref(), Some("localhost"));
        assert_eq!(rule.from.as_str(), "/hello-world");
    }

    #[test]
    fn test_target_substitution() {
        let rule = RedirectRule::new("/blog/:year/*", "/news/:year/:splat", RedirectStatus::default(), None).unwrap();
        let params = rule.from.captures("/blog/2024/hello/world").unwrap();
        assert_eq!(rule.target(&params), "/news/2024/hello/world");

        let rule = RedirectRule::new("/old/*", "https://example.com/:splat", RedirectStatus::default(), None).unwrap();
        let params = rule.from.captures("/old/page").unwrap();
        assert_eq!(rule.target(&params), "https://example.com/page");
    }

    #[test]
    fn test_config_rule() {
        let config = RedirectConfig {
            from: "/admin/*".into(),
            to: String::new(),
            status: Some(StatusValue::Code(200)),
            force: true,
            conditions: BTreeMap::from([("Role".to_string(), OneOrMany::One("admin".into()))]),
        };
        let rule = config.to_rule().unwrap();
        assert!(rule.status.force);
        assert!(rule.condition.unwrap().roles.contains("admin"));
    }

    #[test]
    fn test_unknown_condition_is_rejected() {
        let config = RedirectConfig {
            from: "/x".into(),
            to: "/y".into(),
            status: None,
            force: false,
            conditions: BTreeMap::from([("Language".to_string(), OneOrMany::One("en".into()))]),
        };
        assert!(matches!(config.to_rule(), Err(RedirectParseError::Condition(_))));
    }
}
