//! Registry snapshots and their publication.
//!
//! # Data Flow
//! ```text
//! DevConfig
//!     → manifest::load_manifests → manifest::merge   (bindings, import map)
//!     → redirects::load_rules                        (redirect rules)
//!     → Registry { generation, ... }
//!     → RegistryHandle::publish (one atomic pointer swap)
//!     → Router: RegistryHandle::load per request
//! ```
//!
//! # Design Decisions
//! - A snapshot is never mutated after publication
//! - Readers never lock: `ArcSwap` gives each request one consistent view
//! - Every publication is announced on a broadcast channel

pub mod watcher;

use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::schema::DevConfig;
use crate::config::ConfigError;
use crate::manifest::{self, EdgeFunctionBinding, FunctionInventory, ImportMap, ImportMapConflict, ManifestError};
use crate::redirects::{self, RedirectMatcher, RedirectParseError};

pub use watcher::{rebuild, RegistryWatcher};

/// Errors raised while building a snapshot.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("redirects: {0}")]
    Redirects(#[from] RedirectParseError),
}

/// Merged, resolved routing state.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub generation: u64,
    pub bindings: Vec<Arc<EdgeFunctionBinding>>,
    pub import_map: Arc<ImportMap>,
    pub conflicts: Vec<ImportMapConflict>,
    pub redirects: RedirectMatcher,
    pub functions: FunctionInventory,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every source for `config` and merge them.
    pub fn build(config: &DevConfig, generation: u64) -> Result<Self, RegistryError> {
        let loaded = manifest::load_manifests(config)?;
        let merged = manifest::merge(loaded.manifests);
        let rules = redirects::load_rules(&config.redirects, &config.redirects_file())?;

        Ok(Self {
            generation,
            bindings: merged.bindings,
            import_map: Arc::new(merged.import_map),
            conflicts: merged.conflicts,
            redirects: RedirectMatcher::new(rules),
            functions: loaded.inventory,
        })
    }
}

/// Outcome of a rebuild, announced to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadEvent {
    Reloaded { generation: u64, bindings: usize },
    Failed { error: String },
}

/// Shared pointer to the active snapshot.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    current: Arc<ArcSwap<Registry>>,
    events: broadcast::Sender<ReloadEvent>,
}

impl RegistryHandle {
    pub fn new(initial: Registry) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
            events,
        }
    }

    /// Snapshot for one request.
    pub fn load(&self) -> Arc<Registry> {
        self.current.load_full()
    }

    /// Replace the active snapshot and announce it.
    pub fn publish(&self, registry: Registry) {
        let event = ReloadEvent::Reloaded {
            generation: registry.generation,
            bindings: registry.bindings.len(),
        };
        self.current.store(Arc::new(registry));
        let _ = self.events.send(event);
    }

    /// Announce a rejected rebuild. The active snapshot is kept.
    pub fn reject(&self, error: String) {
        let _ = self.events.send(ReloadEvent::Failed { error });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.events.subscribe()
    }
}
