//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! netlify.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DevConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     registry watcher detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → registry rebuilt from the new edge_functions / redirects
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Relative paths resolve against the directory holding the file

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_project, parse_config, ConfigError};
pub use schema::{
    BuildConfig, DevConfig, DevSettings, EdgeFunctionDeclaration, FunctionsConfig, ListenerConfig,
    ObservabilityConfig, OneOrMany, RoutingConfig, SandboxConfig, SiteConfig, Stage, TimeoutConfig,
    WatchConfig,
};
