//! Order-preserving merge of manifests from several sources.

use std::sync::Arc;

use crate::manifest::binding::{EdgeFunctionBinding, SourceKind};
use crate::manifest::import_map::{ImportMap, ImportMapConflict};

/// Bindings and import map contributed by one source.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub kind: SourceKind,
    pub bindings: Vec<EdgeFunctionBinding>,
    pub import_map: Option<ImportMap>,
}

impl Manifest {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            bindings: Vec::new(),
            import_map: None,
        }
    }
}

/// Result of merging manifests.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub bindings: Vec<Arc<EdgeFunctionBinding>>,
    pub import_map: ImportMap,
    pub conflicts: Vec<ImportMapConflict>,
}

/// Merge manifests: config, then in-source, then internal.
///
/// Order inside a source and among manifests of the same kind is kept.
/// Bindings are not deduplicated by name. Import maps are unioned with the
/// last writer winning; every collision is reported and logged.
pub fn merge(mut sources: Vec<Manifest>) -> MergeOutcome {
    sources.sort_by_key(|m| m.kind);

    let mut outcome = MergeOutcome::default();
    for manifest in sources {
        if let Some(map) = &manifest.import_map {
            for conflict in outcome.import_map.union(map) {
                tracing::warn!(
                    specifier = %conflict.specifier,
                    previous = %conflict.previous,
                    replacement = %conflict.replacement,
                    source = ?manifest.kind,
                    "Import map specifier declared by more than one source"
                );
                outcome.conflicts.push(conflict);
            }
        }
        outcome
            .bindings
            .extend(manifest.bindings.into_iter().map(Arc::new));
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{EdgeFunctionDeclaration, OneOrMany};
    use crate::manifest::binding::FunctionSource;
    use std::path::PathBuf;

    fn binding(name: &str, kind: SourceKind) -> EdgeFunctionBinding {
        EdgeFunctionBinding::from_declaration(
            &EdgeFunctionDeclaration {
                function: name.into(),
                path: OneOrMany::One("/x".into()),
                excluded_path: OneOrMany::default(),
                cache: None,
                on_error: None,
            },
            FunctionSource {
                name: name.into(),
                path: PathBuf::from(format!("{}.ts", name)),
                internal: kind == SourceKind::Internal,
            },
            kind,
        )
        .unwrap()
    }

    fn manifest(kind: SourceKind, names: &[&str], imports: &[(&str, &str)]) -> Manifest {
        Manifest {
            kind,
            bindings: names.iter().map(|n| binding(n, kind)).collect(),
            import_map: Some(ImportMap {
                imports: imports.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            }),
        }
    }

    #[test]
    fn test_precedence_and_intra_source_order() {
        let outcome = merge(vec![
            manifest(SourceKind::Internal, &["i1", "i2"], &[]),
            manifest(SourceKind::InSource, &["s1"], &[]),
            manifest(SourceKind::Config, &["c2", "c1"], &[]),
        ]);
        let names: Vec<_> = outcome.bindings.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["c2", "c1", "s1", "i1", "i2"]);
    }

    #[test]
    fn test_same_name_is_not_deduplicated() {
        let outcome = merge(vec![
            manifest(SourceKind::Config, &["hello"], &[]),
            manifest(SourceKind::InSource, &["hello"], &[]),
        ]);
        assert_eq!(outcome.bindings.len(), 2);
        assert_eq!(outcome.bindings[0].declared_in, SourceKind::Config);
        assert_eq!(outcome.bindings[1].declared_in, SourceKind::InSource);
    }

    #[test]
    fn test_import_maps_union_with_conflicts() {
        let outcome = merge(vec![
            manifest(SourceKind::Internal, &[], &[("yeller", "file:///i/yeller.ts"), ("shared", "file:///i/s.ts")]),
            manifest(SourceKind::Config, &[], &[("greeter", "file:///u/greeter.ts"), ("shared", "file:///u/s.ts")]),
        ]);
        assert_eq!(outcome.import_map.resolve("greeter").unwrap(), "file:///u/greeter.ts");
        assert_eq!(outcome.import_map.resolve("yeller").unwrap(), "file:///i/yeller.ts");
        // internal merges last
        assert_eq!(outcome.import_map.resolve("shared").unwrap(), "file:///i/s.ts");
        assert_eq!(outcome.conflicts.len(), 1);
    }
}
