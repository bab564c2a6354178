//! Edge function bindings.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::schema::EdgeFunctionDeclaration;
use crate::manifest::ManifestError;
use crate::routing::matcher::RoutePattern;

/// Where a binding was declared. Ordering is merge precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// `[[edge_functions]]` in the configuration file.
    Config,
    /// Metadata co-located with a user function.
    InSource,
    /// The internally generated function directory.
    Internal,
}

/// Response caching mode of a binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    #[default]
    Automatic,
    Manual,
}

/// Error raised for an unknown policy or mode string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid value `{value}`: expected {expected}")]
pub struct InvalidOption {
    pub value: String,
    pub expected: &'static str,
}

impl FromStr for CacheMode {
    type Err = InvalidOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(CacheMode::Automatic),
            "manual" => Ok(CacheMode::Manual),
            other => Err(InvalidOption {
                value: other.to_string(),
                expected: "`automatic` or `manual`",
            }),
        }
    }
}

/// Behaviour when a binding's handler fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Respond 500 with a description of the failure.
    #[default]
    Fail,
    /// Act as if the binding did not exist.
    Bypass,
    /// Serve the content at this path with status 200.
    Fallback(String),
}

impl OnError {
    pub fn parse(value: &str) -> Result<Self, InvalidOption> {
        match value {
            "fail" => Ok(OnError::Fail),
            "bypass" => Ok(OnError::Bypass),
            path if path.starts_with('/') => Ok(OnError::Fallback(path.to_string())),
            other => Err(InvalidOption {
                value: other.to_string(),
                expected: "`fail`, `bypass` or a path starting with `/`",
            }),
        }
    }
}

/// A discovered function source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionSource {
    pub name: String,
    /// Entry point on disk; opaque to routing, handed to the sandbox.
    pub path: PathBuf,
    /// Lives in the internal directory.
    pub internal: bool,
}

/// A named handler bound to path patterns.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeFunctionBinding {
    pub name: String,
    pub paths: Vec<RoutePattern>,
    pub excluded_paths: Vec<RoutePattern>,
    pub cache: CacheMode,
    pub on_error: OnError,
    pub source: FunctionSource,
    pub declared_in: SourceKind,
}

impl EdgeFunctionBinding {
    /// Build a binding from a declaration.
    pub fn from_declaration(
        decl: &EdgeFunctionDeclaration,
        source: FunctionSource,
        declared_in: SourceKind,
    ) -> Result<Self, ManifestError> {
        let compile = |patterns: Vec<String>| {
            patterns
                .iter()
                .map(|p| RoutePattern::parse(p))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ManifestError::Pattern {
                    function: decl.function.clone(),
                    source: e,
                })
        };
        let invalid = |e: InvalidOption| ManifestError::InvalidOption {
            function: decl.function.clone(),
            source: e,
        };

        Ok(Self {
            name: decl.function.clone(),
            paths: compile(decl.path.clone().into_vec())?,
            excluded_paths: compile(decl.excluded_path.clone().into_vec())?,
            cache: decl
                .cache
                .as_deref()
                .map(CacheMode::from_str)
                .transpose()
                .map_err(invalid)?
                .unwrap_or_default(),
            on_error: decl
                .on_error
                .as_deref()
                .map(OnError::parse)
                .transpose()
                .map_err(invalid)?
                .unwrap_or_default(),
            source,
            declared_in,
        })
    }

    /// Included iff a path pattern matches and no exclusion does.
    pub fn matches(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p.matches(path)) && !self.excluded_paths.iter().any(|p| p.matches(path))
    }
}
