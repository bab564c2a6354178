//! Edge function manifests.
//!
//! # Data Flow
//! ```text
//! [[edge_functions]]      <name>.config.json       .netlify/edge-functions/manifest.json
//!  (config-declared)       (in-source, user)         (internal, generated)
//!         │                      │                          │
//!         └──────── loader.rs: Manifest { kind, bindings, import_map } ─┘
//!                                │
//!                        merge.rs (config → in-source → internal)
//!                                │
//!                  MergeOutcome { bindings, import_map, conflicts }
//!                                │
//!                        registry snapshot
//! ```
//!
//! # Design Decisions
//! - Sources are tagged values merged by one explicit function
//! - Bindings keep declaration order; same-named bindings stay distinct
//! - Import map collisions resolve last-writer-wins and are reported

pub mod binding;
pub mod import_map;
pub mod loader;
pub mod merge;

use std::path::PathBuf;

use thiserror::Error;

use crate::routing::matcher::PatternError;

pub use binding::{CacheMode, EdgeFunctionBinding, FunctionSource, OnError, SourceKind};
pub use import_map::{ImportMap, ImportMapConflict};
pub use loader::{load_manifests, prepare_internal_dir, FunctionInventory, LoadedManifests};
pub use merge::{merge, Manifest, MergeOutcome};

/// Errors raised while loading manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error on `{0}`: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid JSON in `{0}`: {1}")]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("edge function `{function}`: {source}")]
    Pattern {
        function: String,
        #[source]
        source: PatternError,
    },

    #[error("edge function `{function}`: {source}")]
    InvalidOption {
        function: String,
        #[source]
        source: binding::InvalidOption,
    },
}
