//! Stack configuration table.
//!
//! A stack pairs the images a builder is based on (`build-images`) with the
//! images applications run on (`run-images`). The table is loaded from
//! `config.toml` in the bpack home directory and handed to the spec resolver
//! explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

/// Stack used when no configuration file exists.
pub const DEFAULT_STACK_ID: &str = "io.buildpacks.stacks.bionic";

/// Environment variable overriding the bpack home directory.
pub const HOME_ENV: &str = "BPACK_HOME";

/// A single stack entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StackConfig {
    /// Stack identifier (e.g., "io.buildpacks.stacks.bionic")
    pub id: String,

    /// Candidate base images for builders, in preference order
    #[serde(default)]
    pub build_images: Vec<String>,

    /// Candidate run images
    #[serde(default)]
    pub run_images: Vec<String>,
}

/// What to do when no build image lives on the target registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryFallback {
    /// Use the first declared build image
    #[default]
    First,
    /// Fail with a configuration error
    Strict,
}

/// Stack configuration table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StackTable {
    /// Stack selected when the caller passes an empty stack id
    #[serde(default)]
    pub default_stack_id: String,

    /// Known stacks
    #[serde(default)]
    pub stacks: Vec<StackConfig>,

    /// Build image tie-break policy
    #[serde(default)]
    pub registry_fallback: RegistryFallback,
}

impl Default for StackTable {
    fn default() -> Self {
        Self {
            default_stack_id: DEFAULT_STACK_ID.to_string(),
            stacks: vec![StackConfig {
                id: DEFAULT_STACK_ID.to_string(),
                build_images: vec!["packs/build".to_string()],
                run_images: vec!["packs/run".to_string()],
            }],
            registry_fallback: RegistryFallback::First,
        }
    }
}

impl StackTable {
    /// Load the table from a TOML file.
    ///
    /// A missing file yields the default table.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No stack config, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            BuildError::ConfigError(format!(
                "Failed to read stack config {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&content).map_err(|e| {
            BuildError::ConfigError(format!(
                "Failed to parse stack config {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Look up a stack by id; an empty id selects the default stack.
    pub fn get(&self, stack_id: &str) -> Result<&StackConfig> {
        let id = if stack_id.is_empty() {
            self.default_stack_id.as_str()
        } else {
            stack_id
        };

        self.stacks
            .iter()
            .find(|stack| stack.id == id)
            .ok_or_else(|| BuildError::ConfigError(format!("Missing stack: stack with id \"{}\" not found", id)))
    }
}

/// bpack home directory (`$BPACK_HOME`, else `~/.bpack`).
pub fn bpack_home() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|h| h.join(".bpack"))
        .unwrap_or_else(|| PathBuf::from(".bpack"))
}

/// Default location of the stack table.
pub fn default_config_path() -> PathBuf {
    bpack_home().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_table() {
        let table = StackTable::default();
        let stack = table.get("").unwrap();
        assert_eq!(stack.id, DEFAULT_STACK_ID);
        assert_eq!(stack.build_images, vec!["packs/build".to_string()]);
        assert_eq!(table.registry_fallback, RegistryFallback::First);
    }

    #[test]
    fn test_get_unknown_stack() {
        let table = StackTable::default();
        let err = table.get("com.example.missing").unwrap_err();
        assert!(matches!(err, BuildError::ConfigError(_)));
        assert!(err.to_string().contains("com.example.missing"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let table = StackTable::load(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(table, StackTable::default());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default-stack-id = "my.stack"
registry-fallback = "strict"

[[stacks]]
id = "my.stack"
build-images = ["gcr.io/me/build", "docker.io/me/build"]
run-images = ["gcr.io/me/run"]
"#,
        )
        .unwrap();

        let table = StackTable::load(&path).unwrap();
        assert_eq!(table.registry_fallback, RegistryFallback::Strict);
        let stack = table.get("").unwrap();
        assert_eq!(stack.id, "my.stack");
        assert_eq!(stack.build_images.len(), 2);
        assert_eq!(stack.run_images, vec!["gcr.io/me/run".to_string()]);
    }

    #[test]
    fn test_load_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "stacks = 3").unwrap();

        let err = StackTable::load(&path).unwrap_err();
        assert!(matches!(err, BuildError::ConfigError(_)));
        assert!(err.to_string().contains("config.toml"));
    }
}
