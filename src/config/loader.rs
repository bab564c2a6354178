//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::DevConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Default configuration file name looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "netlify.toml";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading `{0}`: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str, project_root: &Path) -> Result<DevConfig, ConfigError> {
    let mut config: DevConfig = toml::from_str(content)?;
    config.project_root = project_root.to_path_buf();
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
///
/// The file's directory becomes the project root.
pub fn load_config(path: &Path) -> Result<DevConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut config = parse_config(&content, &root)?;
    config.config_path = Some(path.to_path_buf());
    Ok(config)
}

/// Load `netlify.toml` from `project_root`, or defaults when it is absent.
pub fn load_project(project_root: &Path) -> Result<DevConfig, ConfigError> {
    let path = project_root.join(CONFIG_FILE_NAME);
    if path.exists() {
        load_config(&path)
    } else {
        let mut config = DevConfig::default();
        config.project_root = project_root.to_path_buf();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{OneOrMany, Stage};

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [build]
            publish = "public"
            edge_functions = "netlify/edge-functions"

            [functions]
            deno_import_map = "import_map.json"

            [dev]
            jwt_secret = "custom"
            jwt_role_path = "roles"
            country = "ES"

            [[edge_functions]]
            function = "hello"
            path = "/hello"
            cache = "manual"

            [[edge_functions]]
            function = "auth"
            path = ["/a", "/b"]
            excludedPath = "/a/static/*"
            onError = "bypass"

            [[redirects]]
            from = "/old"
            to = "/new"
            status = 301

            [routing]
            pipeline = ["redirects", "edge_functions", "origin"]
        "#;

        let config = parse_config(toml, Path::new("/site")).unwrap();
        assert_eq!(config.publish_dir(), PathBuf::from("/site/public"));
        assert_eq!(config.user_import_map(), Some(PathBuf::from("/site/import_map.json")));
        assert_eq!(config.dev.jwt_secret, "custom");
        assert_eq!(config.dev.country.as_deref(), Some("ES"));
        assert_eq!(config.edge_functions.len(), 2);
        assert_eq!(config.edge_functions[1].path, OneOrMany::Many(vec!["/a".into(), "/b".into()]));
        assert_eq!(config.edge_functions[1].excluded_path, OneOrMany::One("/a/static/*".into()));
        assert_eq!(config.edge_functions[1].on_error.as_deref(), Some("bypass"));
        assert_eq!(config.redirects.len(), 1);
        assert_eq!(config.routing.pipeline[0], Stage::Redirects);
    }

    #[test]
    fn test_missing_project_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_project(dir.path()).unwrap();
        assert_eq!(config.project_root, dir.path());
        assert!(config.config_path.is_none());
        assert_eq!(config.dev.jwt_secret, "secret");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = parse_config("[routing]\nmax_rewrites = 0\n", Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("routing.max_rewrites"));
    }
}
