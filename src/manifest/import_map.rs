//! Import maps handed to the execution sandbox.
//!
//! # Responsibilities
//! - Load import map files and resolve relative targets against the file
//! - Union maps from several sources, recording specifier collisions
//! - Resolve a specifier (exact entry, then longest `/`-terminated prefix)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::manifest::ManifestError;

/// Mapping from module specifier to resolved location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMap {
    #[serde(default)]
    pub imports: BTreeMap<String, String>,
}

/// A specifier declared by more than one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportMapConflict {
    pub specifier: String,
    pub previous: String,
    pub replacement: String,
}

impl ImportMap {
    /// Load an import map file, resolving relative targets to `file://` URLs.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|e| ManifestError::Io(path.to_path_buf(), e))?;
        let raw: ImportMap =
            serde_json::from_str(&content).map_err(|e| ManifestError::Json(path.to_path_buf(), e))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(raw.resolved_against(base))
    }

    fn resolved_against(self, base: &Path) -> Self {
        let imports = self
            .imports
            .into_iter()
            .map(|(specifier, target)| {
                let resolved = if target.starts_with("./") || target.starts_with("../") || target.starts_with('/') {
                    file_url(&base.join(&target)).unwrap_or(target)
                } else {
                    target
                };
                (specifier, resolved)
            })
            .collect();
        Self { imports }
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }

    /// Merge `other` into `self`. Later entries win; collisions are returned.
    pub fn union(&mut self, other: &ImportMap) -> Vec<ImportMapConflict> {
        let mut conflicts = Vec::new();
        for (specifier, target) in &other.imports {
            if let Some(previous) = self.imports.insert(specifier.clone(), target.clone()) {
                if &previous != target {
                    conflicts.push(ImportMapConflict {
                        specifier: specifier.clone(),
                        previous,
                        replacement: target.clone(),
                    });
                }
            }
        }
        conflicts
    }

    /// Resolve a bare specifier.
    pub fn resolve(&self, specifier: &str) -> Option<String> {
        if let Some(target) = self.imports.get(specifier) {
            return Some(target.clone());
        }
        self.imports
            .iter()
            .filter(|(prefix, _)| prefix.ends_with('/') && specifier.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, target)| format!("{}{}", target, &specifier[prefix.len()..]))
    }
}

fn file_url(path: &Path) -> Option<String> {
    let absolute = std::path::absolute(path).ok()?;
    Url::from_file_path(normalize(&absolute)).ok().map(String::from)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> ImportMap {
        ImportMap {
            imports: entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn test_load_resolves_relative_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import_map.json");
        fs::write(
            &path,
            r#"{"imports": {"greeter": "./greeter.ts", "std/": "https://deno.land/std/", "up": "../shared/up.ts"}}"#,
        )
        .unwrap();

        let map = ImportMap::load(&path).unwrap();
        let greeter = map.resolve("greeter").unwrap();
        assert!(greeter.starts_with("file://"));
        assert!(greeter.ends_with("/greeter.ts"));
        assert!(!greeter.contains("/./"));
        assert!(!map.resolve("up").unwrap().contains(".."));
        assert_eq!(map.resolve("std/path/mod.ts").unwrap(), "https://deno.land/std/path/mod.ts");
        assert!(map.resolve("unknown").is_none());
    }

    #[test]
    fn test_union_keeps_both_sources() {
        let mut merged = map(&[("greeter", "file:///user/greeter.ts")]);
        let conflicts = merged.union(&map(&[("yeller", "file:///internal/yeller.ts")]));
        assert!(conflicts.is_empty());
        assert_eq!(merged.resolve("greeter").unwrap(), "file:///user/greeter.ts");
        assert_eq!(merged.resolve("yeller").unwrap(), "file:///internal/yeller.ts");
    }

    #[test]
    fn test_union_collision_is_last_writer_and_reported() {
        let mut merged = map(&[("shared", "file:///a.ts")]);
        let conflicts = merged.union(&map(&[("shared", "file:///b.ts")]));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].previous, "file:///a.ts");
        assert_eq!(merged.resolve("shared").unwrap(), "file:///b.ts");
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import_map.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(ImportMap::load(&path), Err(ManifestError::Json(..))));
    }
}
