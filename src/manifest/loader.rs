//! Manifest loading from the function directories.
//!
//! # Responsibilities
//! - Discover function sources (`<name>.<ext>`, `<name>/index.<ext>`)
//! - Build the config-declared manifest (dropping bindings without a source)
//! - Read co-located in-source configuration
//! - Read the internal `manifest.json` and its import map
//! - Prepare (clear and recreate) the internal directory at startup
//!
//! # Design Decisions
//! - Discovery is deterministic: sources are visited in name order and
//!   a clash is settled by `function_extensions` order, files before
//!   index directories
//! - A missing directory is an empty source, not an error
//! - Any malformed file fails the whole load so a reload can be rejected

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::schema::{DevConfig, EdgeFunctionDeclaration, OneOrMany};
use crate::manifest::binding::{EdgeFunctionBinding, FunctionSource, SourceKind};
use crate::manifest::import_map::ImportMap;
use crate::manifest::merge::Manifest;
use crate::manifest::ManifestError;

/// Internal manifest file name.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Suffix of co-located configuration next to a single-file function.
pub const IN_SOURCE_SUFFIX: &str = ".config.json";

/// Functions discovered in the user and internal directories.
#[derive(Debug, Clone, Default)]
pub struct FunctionInventory {
    pub user: BTreeMap<String, FunctionSource>,
    pub internal: BTreeMap<String, FunctionSource>,
}

impl FunctionInventory {
    /// Discover functions in both directories.
    pub fn discover(user_dir: &Path, internal_dir: &Path, extensions: &[String]) -> Result<Self, ManifestError> {
        Ok(Self {
            user: discover_dir(user_dir, extensions, false)?,
            internal: discover_dir(internal_dir, extensions, true)?,
        })
    }

    /// Look a function up by name, user functions first.
    pub fn get(&self, name: &str) -> Option<&FunctionSource> {
        self.user.get(name).or_else(|| self.internal.get(name))
    }

    pub fn len(&self) -> usize {
        self.user.len() + self.internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn discover_dir(
    dir: &Path,
    extensions: &[String],
    internal: bool,
) -> Result<BTreeMap<String, FunctionSource>, ManifestError> {
    let mut found = BTreeMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(ManifestError::Io(dir.to_path_buf(), e)),
    };
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ManifestError::Io(dir.to_path_buf(), e))?;
    paths.sort();

    // Lower rank wins: `<name>.<ext>` before `<name>/index.<ext>`, then
    // extension order.
    let mut ranks: BTreeMap<String, (bool, usize)> = BTreeMap::new();
    for path in paths {
        let (name, source, rank) = if path.is_dir() {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let index = extensions
                .iter()
                .enumerate()
                .map(|(i, ext)| (i, path.join(format!("index.{}", ext))))
                .find(|(_, candidate)| candidate.is_file());
            let Some((i, index)) = index else {
                continue;
            };
            (name.to_string(), index, (true, i))
        } else {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            let Some(i) = extensions.iter().position(|known| known == ext) else {
                continue;
            };
            let Some(name) = path.file_stem().and_then(|n| n.to_str()) else {
                continue;
            };
            (name.to_string(), path.clone(), (false, i))
        };

        if ranks.get(&name).is_some_and(|best| *best <= rank) {
            continue;
        }
        ranks.insert(name.clone(), rank);
        found.insert(
            name.clone(),
            FunctionSource {
                name,
                path: source,
                internal,
            },
        );
    }

    Ok(found)
}

/// Co-located configuration of a function.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InSourceConfig {
    #[serde(default)]
    path: OneOrMany,
    #[serde(default)]
    excluded_path: OneOrMany,
    #[serde(default)]
    cache: Option<String>,
    #[serde(default)]
    on_error: Option<String>,
}

fn in_source_config_path(source: &FunctionSource) -> PathBuf {
    let is_index = source
        .path
        .file_stem()
        .map(|stem| stem == "index")
        .unwrap_or(false)
        && source
            .path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n == source.name.as_str())
            .unwrap_or(false);
    if is_index {
        source.path.with_file_name("config.json")
    } else {
        source.path.with_file_name(format!("{}{}", source.name, IN_SOURCE_SUFFIX))
    }
}

fn read_in_source(source: &FunctionSource) -> Result<Option<EdgeFunctionDeclaration>, ManifestError> {
    let path = in_source_config_path(source);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ManifestError::Io(path, e)),
    };
    let config: InSourceConfig = serde_json::from_str(&content).map_err(|e| ManifestError::Json(path, e))?;
    Ok(Some(EdgeFunctionDeclaration {
        function: source.name.clone(),
        path: config.path,
        excluded_path: config.excluded_path,
        cache: config.cache,
        on_error: config.on_error,
    }))
}

fn in_source_bindings(
    sources: &BTreeMap<String, FunctionSource>,
    kind: SourceKind,
) -> Result<Vec<EdgeFunctionBinding>, ManifestError> {
    let mut bindings = Vec::new();
    for source in sources.values() {
        if let Some(decl) = read_in_source(source)? {
            if decl.path.clone().into_vec().is_empty() {
                continue;
            }
            bindings.push(EdgeFunctionBinding::from_declaration(&decl, source.clone(), kind)?);
        }
    }
    Ok(bindings)
}

/// The internally generated manifest file.
#[derive(Debug, Clone, Default, Deserialize)]
struct InternalManifest {
    #[serde(default)]
    functions: Vec<EdgeFunctionDeclaration>,
    #[serde(default)]
    import_map: Option<String>,
    #[serde(default)]
    version: u32,
}

fn read_internal_manifest(dir: &Path) -> Result<Option<InternalManifest>, ManifestError> {
    let path = dir.join(MANIFEST_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ManifestError::Io(path, e)),
    };
    let manifest: InternalManifest = serde_json::from_str(&content).map_err(|e| ManifestError::Json(path, e))?;
    tracing::debug!(version = manifest.version, functions = manifest.functions.len(), "Read internal manifest");
    Ok(Some(manifest))
}

/// Everything loaded from disk for one registry build.
#[derive(Debug, Clone)]
pub struct LoadedManifests {
    pub inventory: FunctionInventory,
    pub manifests: Vec<Manifest>,
}

/// Load the config, in-source and internal manifests for `config`.
pub fn load_manifests(config: &DevConfig) -> Result<LoadedManifests, ManifestError> {
    let internal_dir = config.internal_functions_dir();
    let inventory = FunctionInventory::discover(
        &config.user_functions_dir(),
        &internal_dir,
        &config.dev.function_extensions,
    )?;

    let mut declared = Manifest::new(SourceKind::Config);
    for decl in &config.edge_functions {
        match inventory.get(&decl.function) {
            Some(source) => declared.bindings.push(EdgeFunctionBinding::from_declaration(
                decl,
                source.clone(),
                SourceKind::Config,
            )?),
            None => tracing::debug!(function = %decl.function, "Declared edge function has no source, skipping"),
        }
    }
    if let Some(path) = config.user_import_map() {
        declared.import_map = Some(ImportMap::load(&path)?);
    }

    let mut in_source = Manifest::new(SourceKind::InSource);
    in_source.bindings = in_source_bindings(&inventory.user, SourceKind::InSource)?;

    let mut internal = Manifest::new(SourceKind::Internal);
    if let Some(manifest) = read_internal_manifest(&internal_dir)? {
        for decl in &manifest.functions {
            match inventory.internal.get(&decl.function) {
                Some(source) => internal.bindings.push(EdgeFunctionBinding::from_declaration(
                    decl,
                    source.clone(),
                    SourceKind::Internal,
                )?),
                None => tracing::debug!(function = %decl.function, "Internal manifest entry has no source, skipping"),
            }
        }
        if let Some(map) = &manifest.import_map {
            internal.import_map = Some(ImportMap::load(&internal_dir.join(map))?);
        }
    }
    internal
        .bindings
        .extend(in_source_bindings(&inventory.internal, SourceKind::Internal)?);

    Ok(LoadedManifests {
        inventory,
        manifests: vec![declared, in_source, internal],
    })
}

/// Clear and recreate the internal function directory.
pub fn prepare_internal_dir(dir: &Path) -> Result<(), ManifestError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(ManifestError::Io(dir.to_path_buf(), e)),
    }
    fs::create_dir_all(dir).map_err(|e| ManifestError::Io(dir.to_path_buf(), e))
}
