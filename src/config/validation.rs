//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check pipeline shape (every stage at most once, origin present)
//! - Validate value ranges (timeouts > 0, rewrite bound > 0)
//! - Check declared edge functions and redirect rules are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DevConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{DevConfig, Stage};
use crate::manifest::binding::OnError;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &DevConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for stage in &config.routing.pipeline {
        if !seen.insert(*stage) {
            errors.push(ValidationError::new(
                "routing.pipeline",
                format!("stage {:?} listed more than once", stage),
            ));
        }
    }
    if !seen.contains(&Stage::Origin) {
        errors.push(ValidationError::new("routing.pipeline", "the origin stage is required"));
    }
    if config.routing.max_rewrites == 0 {
        errors.push(ValidationError::new("routing.max_rewrites", "must be greater than zero"));
    }
    if config.timeouts.function_secs == 0 {
        errors.push(ValidationError::new("timeouts.function_secs", "must be greater than zero"));
    }

    if let Some(country) = &config.dev.country {
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push(ValidationError::new(
                "dev.country",
                format!("`{}` is not a two-letter country code", country),
            ));
        }
    }

    for (i, decl) in config.edge_functions.iter().enumerate() {
        let field = format!("edge_functions[{}]", i);
        if decl.function.trim().is_empty() {
            errors.push(ValidationError::new(&field, "function name is empty"));
        }
        if let Some(cache) = &decl.cache {
            if cache != "manual" && cache != "automatic" {
                errors.push(ValidationError::new(
                    format!("{}.cache", field),
                    format!("unknown cache mode `{}`", cache),
                ));
            }
        }
        if let Some(on_error) = &decl.on_error {
            if let Err(e) = OnError::parse(on_error) {
                errors.push(ValidationError::new(format!("{}.on_error", field), e.to_string()));
            }
        }
    }

    for (i, rule) in config.redirects.iter().enumerate() {
        if let Err(e) = rule.to_rule() {
            errors.push(ValidationError::new(format!("redirects[{}]", i), e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EdgeFunctionDeclaration;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&DevConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = DevConfig::default();
        config.routing.pipeline = vec![Stage::Redirects, Stage::Redirects];
        config.routing.max_rewrites = 0;
        config.dev.country = Some("Spain".into());
        config.edge_functions.push(EdgeFunctionDeclaration {
            function: "hello".into(),
            path: Default::default(),
            excluded_path: Default::default(),
            cache: Some("sometimes".into()),
            on_error: Some("nonsense".into()),
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"routing.pipeline"));
        assert!(fields.contains(&"routing.max_rewrites"));
        assert!(fields.contains(&"dev.country"));
        assert!(fields.contains(&"edge_functions[0].cache"));
        assert!(fields.contains(&"edge_functions[0].on_error"));
    }
}
