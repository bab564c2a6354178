//! Startup orchestration.
//!
//! # Responsibilities
//! - Prepare the internal functions directory
//! - Build the first registry snapshot
//! - Fetch site metadata and read local environment files
//! - Assemble the router around the static origin and a sandbox
//!
//! # Design Decisions
//! - Fail fast: a broken initial registry is fatal, later ones are not
//! - Missing site metadata degrades to offline values
//! - Listeners start last, in `main`

use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::DevConfig;
use crate::edge::env::load_env_files;
use crate::edge::sandbox::Sandbox;
use crate::manifest::{prepare_internal_dir, ManifestError};
use crate::origin::StaticOrigin;
use crate::registry::{Registry, RegistryError, RegistryHandle};
use crate::routing::Router;
use crate::site::{provider_for, resolve_metadata};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("internal functions directory: {0}")]
    InternalDir(#[from] ManifestError),

    #[error("initial registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("environment files: {0}")]
    EnvFiles(#[from] std::io::Error),
}

/// Everything the server and the watcher need.
#[derive(Clone)]
pub struct Services {
    pub config: DevConfig,
    pub registry: RegistryHandle,
    pub router: Router,
}

/// Build the services for `config`, executing functions in `sandbox`.
pub async fn bootstrap(config: DevConfig, sandbox: Arc<dyn Sandbox>) -> Result<Services, StartupError> {
    prepare_internal_dir(&config.internal_functions_dir())?;

    let registry = Registry::build(&config, 0)?;
    tracing::info!(
        bindings = registry.bindings.len(),
        functions = registry.functions.len(),
        redirects = registry.redirects.rules().len(),
        import_map_conflicts = registry.conflicts.len(),
        "Loaded edge functions"
    );
    let registry = RegistryHandle::new(registry);

    let local_url = format!("http://{}", config.listener.bind_address);
    let provider = provider_for(&config.site, config.dev.offline, &local_url);
    let metadata = resolve_metadata(provider.as_ref(), &local_url, config.site.site_id.clone()).await;
    let env_files = load_env_files(&config.project_root)?;

    let origin = StaticOrigin::new(config.publish_dir(), config.dev.target_port);
    let router = Router::new(&config, registry.clone(), Arc::new(origin), sandbox)
        .with_site(metadata)
        .with_env_files(env_files);

    Ok(Services {
        config,
        registry,
        router,
    })
}
