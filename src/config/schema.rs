//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dev
//! server. All types derive Serde traits for deserialization from the
//! project's TOML file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::redirects::RedirectConfig;

/// Root configuration for the edge dev server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DevConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Build settings (publish dir, user edge function dir).
    pub build: BuildConfig,

    /// Serverless function settings (import map).
    pub functions: FunctionsConfig,

    /// Local emulation settings.
    pub dev: DevSettings,

    /// Edge functions declared in configuration.
    pub edge_functions: Vec<EdgeFunctionDeclaration>,

    /// Redirect rules declared in configuration.
    pub redirects: Vec<RedirectConfig>,

    /// Pipeline order and rewrite bounds.
    pub routing: RoutingConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// File watching.
    pub watch: WatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Remote site metadata.
    pub site: SiteConfig,

    /// External execution runtime.
    pub sandbox: SandboxConfig,

    /// Directory the configuration was loaded from. Relative paths in the
    /// file resolve against it.
    #[serde(skip)]
    pub project_root: PathBuf,

    /// Path of the configuration file, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl DevConfig {
    /// Resolve a project-relative path.
    pub fn resolve(&self, path: impl AsRef<std::path::Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Absolute publish directory.
    pub fn publish_dir(&self) -> PathBuf {
        self.resolve(&self.build.publish)
    }

    /// Absolute user edge function directory.
    pub fn user_functions_dir(&self) -> PathBuf {
        self.resolve(&self.build.edge_functions)
    }

    /// Absolute internal (generated) edge function directory.
    pub fn internal_functions_dir(&self) -> PathBuf {
        self.resolve(&self.dev.internal_functions_dir)
    }

    /// Absolute path of the user import map, if configured.
    pub fn user_import_map(&self) -> Option<PathBuf> {
        self.functions.deno_import_map.as_ref().map(|p| self.resolve(p))
    }

    /// Absolute path of the `_redirects` file.
    pub fn redirects_file(&self) -> PathBuf {
        self.publish_dir().join("_redirects")
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8888").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8888".to_string(),
        }
    }
}

/// Build settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Directory with static assets.
    pub publish: PathBuf,

    /// Directory with user-authored edge functions.
    pub edge_functions: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            publish: PathBuf::from("."),
            edge_functions: PathBuf::from("netlify/edge-functions"),
        }
    }
}

/// Serverless function settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FunctionsConfig {
    /// User import map, relative to the project root.
    pub deno_import_map: Option<PathBuf>,
}

/// Local emulation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DevSettings {
    /// Secret used to verify identity tokens.
    pub jwt_secret: String,

    /// Dot path to the roles array inside the token claims.
    pub jwt_role_path: String,

    /// Country override; wins over the `nf_country` cookie.
    pub country: Option<String>,

    /// Port of a framework dev server to proxy unmatched requests to.
    pub target_port: Option<u16>,

    /// Directory reserved for internally generated edge functions.
    pub internal_functions_dir: PathBuf,

    /// Extensions recognised as edge function sources.
    pub function_extensions: Vec<String>,

    /// Skip remote site metadata lookups.
    pub offline: bool,
}

impl Default for DevSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "secret".to_string(),
            jwt_role_path: "app_metadata.authorization.roles".to_string(),
            country: None,
            target_port: None,
            internal_functions_dir: PathBuf::from(".netlify/edge-functions"),
            function_extensions: ["js", "jsx", "mjs", "ts", "tsx", "mts", "wasm"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            offline: true,
        }
    }
}

/// One path or a list of paths.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// An edge function binding as written in the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EdgeFunctionDeclaration {
    /// Function name (file stem in the function directory).
    pub function: String,

    /// Path pattern(s) the function is bound to.
    #[serde(default)]
    pub path: OneOrMany,

    /// Path pattern(s) excluded after inclusion.
    #[serde(default, alias = "excludedPath")]
    pub excluded_path: OneOrMany,

    /// `automatic` (default) or `manual`.
    #[serde(default)]
    pub cache: Option<String>,

    /// `fail` (default), `bypass`, or a fallback path.
    #[serde(default, alias = "onError")]
    pub on_error: Option<String>,
}

/// Pipeline stage identifiers.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    EdgeFunctions,
    Redirects,
    Origin,
}

/// Routing pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Order in which stages see a request.
    pub pipeline: Vec<Stage>,

    /// Maximum rewrite hops per request.
    pub max_rewrites: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            pipeline: vec![Stage::EdgeFunctions, Stage::Redirects, Stage::Origin],
            max_rewrites: 10,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Budget for the edge function chain of one request, in seconds.
    pub function_secs: u64,

    /// Total request timeout enforced by the HTTP layer, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            function_secs: 30,
            request_secs: 60,
        }
    }
}

/// File watching configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Enable hot reload.
    pub enabled: bool,

    /// Quiet period before a batch of changes triggers a rebuild.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 300,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Remote site metadata source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Platform API base URL.
    pub api_url: String,

    /// Linked site id.
    pub site_id: Option<String>,

    /// API token. Usually supplied through `NETLIFY_AUTH_TOKEN`.
    pub auth_token: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.netlify.com/api/v1".to_string(),
            site_id: None,
            auth_token: None,
        }
    }
}

/// External execution runtime.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SandboxConfig {
    /// Invocation endpoint. Without it no handler can run and every
    /// matching binding fails according to its error policy.
    pub url: Option<String>,
}
