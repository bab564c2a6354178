//! Environment views handed to edge functions.
//!
//! # Responsibilities
//! - Read local `.env` files
//! - Combine platform-derived keys with user and remote variables
//! - Filter out keys that must never reach a handler
//!
//! # Design Decisions
//! - Views are computed by a pure function, never read from the process
//!   environment
//! - Both namespaces are filtered independently against the same rules

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::site::SiteInfo;

/// Local environment files, lowest precedence first.
pub const ENV_FILES: &[&str] = &[".env", ".env.development", ".env.local", ".env.development.local"];

/// Keys removed from every view.
pub const DENIED_KEYS: &[&str] = &["DENO_DEPLOYMENT_ID", "NODE_ENV", "DEPLOY_URL"];

/// Which global a view is exposed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvNamespace {
    /// The runtime's own environment object.
    Runtime,
    /// The platform global.
    Platform,
}

/// Inputs of an environment view.
#[derive(Debug, Clone, Default)]
pub struct EnvSources {
    pub site: SiteInfo,
    /// Variables from local environment files.
    pub files: BTreeMap<String, String>,
    /// Variables configured remotely for the dev context.
    pub remote: BTreeMap<String, String>,
}

/// Build the view of one namespace.
///
/// Local files override remote values; platform-derived keys override
/// both; denied keys are removed last.
pub fn build_env_view(namespace: EnvNamespace, sources: &EnvSources) -> BTreeMap<String, String> {
    let mut view = sources.remote.clone();
    view.extend(sources.files.iter().map(|(k, v)| (k.clone(), v.clone())));

    view.insert("DENO_REGION".into(), "local".into());
    view.insert("NETLIFY_DEV".into(), "true".into());
    view.insert("URL".into(), sources.site.url.clone());
    if let Some(id) = &sources.site.id {
        view.insert("SITE_ID".into(), id.clone());
    }
    if let Some(name) = &sources.site.name {
        view.insert("SITE_NAME".into(), name.clone());
    }

    for key in DENIED_KEYS {
        view.remove(*key);
    }

    tracing::trace!(namespace = ?namespace, keys = view.len(), "Built environment view");
    view
}

/// Both namespaces of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvViews {
    pub runtime: BTreeMap<String, String>,
    pub platform: BTreeMap<String, String>,
}

impl EnvViews {
    pub fn build(sources: &EnvSources) -> Self {
        Self {
            runtime: build_env_view(EnvNamespace::Runtime, sources),
            platform: build_env_view(EnvNamespace::Platform, sources),
        }
    }
}

/// Read every environment file present in `root`, later files winning.
pub fn load_env_files(root: &Path) -> io::Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    for name in ENV_FILES {
        let content = match fs::read_to_string(root.join(name)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let parsed = parse_env_file(&content);
        tracing::debug!(file = %name, vars = parsed.len(), "Loaded environment file");
        vars.extend(parsed);
    }
    Ok(vars)
}

/// Parse `KEY=value` lines. Supports `export`, quotes and comments.
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim())))
        })
        .collect()
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            let inner = &value[1..value.len() - 1];
            return if quote == '"' {
                inner.replace("\\n", "\n")
            } else {
                inner.to_string()
            };
        }
    }
    // Unquoted values end at an inline comment.
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}
