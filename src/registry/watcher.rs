//! File watcher for edge function hot reload.
//!
//! # Responsibilities
//! - Watch function directories, manifests, import maps, the config file
//!   and the `_redirects` file
//! - Debounce bursts of file system events
//! - Rebuild the registry off the request path and publish it atomically
//!
//! # Design Decisions
//! - Paths that do not exist yet are watched through their nearest
//!   existing ancestor, filtered back to the watched targets
//! - A failed rebuild keeps the current snapshot and only warns

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::loader::{load_config, CONFIG_FILE_NAME};
use crate::config::schema::DevConfig;
use crate::config::ConfigError;
use crate::observability::metrics;
use crate::registry::{Registry, RegistryError, RegistryHandle, ReloadEvent};

/// Watches sources and republishes the registry on change.
pub struct RegistryWatcher {
    config: DevConfig,
    handle: RegistryHandle,
    debounce: Duration,
}

impl RegistryWatcher {
    pub fn new(config: DevConfig, handle: RegistryHandle) -> Self {
        let debounce = Duration::from_millis(config.watch.debounce_ms);
        Self {
            config,
            handle,
            debounce,
        }
    }

    /// Files and directories whose changes trigger a rebuild.
    pub fn targets(config: &DevConfig) -> Vec<PathBuf> {
        let mut targets = vec![
            config.user_functions_dir(),
            config.internal_functions_dir(),
            config.redirects_file(),
            config
                .config_path
                .clone()
                .unwrap_or_else(|| config.project_root.join(CONFIG_FILE_NAME)),
        ];
        if let Some(import_map) = config.user_import_map() {
            targets.push(import_map);
        }
        targets
    }

    /// Start watching. The returned task ends on shutdown.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> Result<JoinHandle<()>, notify::Error> {
        let targets = Self::targets(&self.config);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let filter = targets.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove())
                        && event.paths.iter().any(|p| filter.iter().any(|t| p.starts_with(t)));
                    if relevant {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for (root, mode) in watch_roots(&targets) {
            watcher.watch(&root, mode)?;
            tracing::debug!(path = %root.display(), "Watching for edge function changes");
        }
        tracing::info!(targets = targets.len(), "Edge function watcher started");

        Ok(tokio::spawn(async move {
            // The notify watcher stops when dropped.
            let _watcher = watcher;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    event = rx.recv() => {
                        if event.is_none() {
                            break;
                        }
                        // Wait for a quiet period before rebuilding.
                        while let Ok(Some(())) = tokio::time::timeout(self.debounce, rx.recv()).await {}
                        let config = self.config.clone();
                        let handle = self.handle.clone();
                        match tokio::task::spawn_blocking(move || rebuild(&config, &handle)).await {
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "Registry rebuild task failed"),
                        }
                    }
                }
            }
            tracing::info!("Edge function watcher stopped");
        }))
    }
}

fn watch_roots(targets: &[PathBuf]) -> Vec<(PathBuf, RecursiveMode)> {
    let mut seen = BTreeSet::new();
    targets
        .iter()
        .filter_map(|target| {
            if target.is_dir() {
                return Some((target.clone(), RecursiveMode::Recursive));
            }
            if target.is_file() {
                return Some((target.clone(), RecursiveMode::NonRecursive));
            }
            nearest_existing(target).map(|dir| (dir, RecursiveMode::Recursive))
        })
        .filter(|(root, _)| seen.insert(root.clone()))
        .collect()
}

fn nearest_existing(path: &Path) -> Option<PathBuf> {
    path.ancestors().skip(1).find(|p| p.is_dir()).map(Path::to_path_buf)
}

fn current_config(base: &DevConfig) -> Result<DevConfig, ConfigError> {
    let path = base
        .config_path
        .clone()
        .unwrap_or_else(|| base.project_root.join(CONFIG_FILE_NAME));
    if path.is_file() {
        load_config(&path)
    } else {
        Ok(base.clone())
    }
}

/// Rebuild the registry and publish it, or keep the current one.
pub fn rebuild(base: &DevConfig, handle: &RegistryHandle) -> ReloadEvent {
    let generation = handle.load().generation + 1;
    let result = current_config(base)
        .map_err(RegistryError::from)
        .and_then(|config| Registry::build(&config, generation));

    match result {
        Ok(registry) => {
            let bindings = registry.bindings.len();
            handle.publish(registry);
            metrics::record_reload(true);
            tracing::info!(generation, bindings, "Reloaded edge functions");
            ReloadEvent::Reloaded { generation, bindings }
        }
        Err(e) => {
            let error = e.to_string();
            handle.reject(error.clone());
            metrics::record_reload(false);
            tracing::warn!(error = %error, "Failed to reload edge functions. Keeping current registry.");
            ReloadEvent::Failed { error }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> (tempfile::TempDir, DevConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::load_project(dir.path()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_missing_targets_watch_nearest_ancestor() {
        let (dir, config) = project();
        let roots = watch_roots(&RegistryWatcher::targets(&config));
        assert!(roots.contains(&(dir.path().to_path_buf(), RecursiveMode::Recursive)));
    }

    #[test]
    fn test_rebuild_publishes_next_generation() {
        let (_dir, config) = project();
        let handle = RegistryHandle::new(Registry::build(&config, 0).unwrap());

        fs::create_dir_all(config.user_functions_dir()).unwrap();
        fs::write(config.user_functions_dir().join("hello.ts"), "").unwrap();
        fs::write(
            config.user_functions_dir().join("hello.config.json"),
            r#"{"path": "/hello"}"#,
        )
        .unwrap();

        let event = rebuild(&config, &handle);
        assert_eq!(event, ReloadEvent::Reloaded { generation: 1, bindings: 1 });
        assert_eq!(handle.load().bindings.len(), 1);
    }

    #[test]
    fn test_failed_rebuild_keeps_snapshot() {
        let (_dir, config) = project();
        let handle = RegistryHandle::new(Registry::build(&config, 0).unwrap());

        fs::create_dir_all(config.publish_dir()).unwrap();
        fs::write(config.redirects_file(), "/a /b notastatus\n").unwrap();

        assert!(matches!(rebuild(&config, &handle), ReloadEvent::Failed { .. }));
        assert_eq!(handle.load().generation, 0);
    }

    #[tokio::test]
    async fn test_watcher_reloads_on_change() {
        let (_dir, config) = project();
        fs::create_dir_all(config.user_functions_dir()).unwrap();
        let mut config = config;
        config.watch.debounce_ms = 50;

        let handle = RegistryHandle::new(Registry::build(&config, 0).unwrap());
        let mut events = handle.subscribe();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = RegistryWatcher::new(config.clone(), handle.clone()).spawn(shutdown_rx).unwrap();

        fs::write(config.user_functions_dir().join("hello.ts"), "").unwrap();
        fs::write(config.user_functions_dir().join("hello.config.json"), r#"{"path": "/hello"}"#).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(ReloadEvent::Reloaded { bindings: 1, generation }) = events.recv().await {
                    return generation;
                }
            }
        })
        .await
        .unwrap();
        assert!(event >= 1);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
