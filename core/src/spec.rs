//! Build spec file model (`builder.toml`).
//!
//! ```toml
//! groups = [["java"], ["node", "java"]]
//!
//! [[buildpacks]]
//! id = "java"
//! uri = "./bp-java"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

/// A module (buildpack) referenced by the build spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRef {
    /// Module identity
    pub id: String,

    /// Location: absolute path, path relative to the spec file, or `file://` path
    pub uri: String,
}

/// One execution-order tier: module identities in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleGroup(pub Vec<String>);

impl ModuleGroup {
    /// Module identities in this group.
    pub fn ids(&self) -> &[String] {
        &self.0
    }
}

/// Decoded `builder.toml` contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecFile {
    #[serde(default)]
    pub groups: Vec<ModuleGroup>,

    #[serde(default)]
    pub buildpacks: Vec<ModuleRef>,
}

/// A loaded build spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Target repository name for the composed image
    pub repo_name: String,

    /// Modules in declaration order
    pub modules: Vec<ModuleRef>,

    /// Ordering groups, passed through to the order manifest
    pub groups: Vec<ModuleGroup>,

    /// Stack identifier used to select the base image
    pub stack_id: String,

    /// Directory containing the spec file; relative module locations resolve here
    spec_dir: PathBuf,
}

impl BuildSpec {
    /// Load a build spec from `path`.
    pub fn load(path: &Path, repo_name: &str, stack_id: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BuildError::ConfigError(format!(
                "Failed to read builder config from file \"{}\": {}",
                path.display(),
                e
            ))
        })?;

        let file: SpecFile = toml::from_str(&content).map_err(|e| {
            BuildError::ConfigError(format!(
                "Failed to decode builder config from file \"{}\": {}",
                path.display(),
                e
            ))
        })?;

        let spec_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::new(repo_name, file, stack_id, spec_dir)
    }

    /// Build a spec from decoded file contents.
    ///
    /// Rejects duplicate module identities.
    pub fn new(
        repo_name: &str,
        file: SpecFile,
        stack_id: &str,
        spec_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for module in &file.buildpacks {
            if !seen.insert(module.id.as_str()) {
                return Err(BuildError::ValidationError(format!(
                    "buildpack \"{}\" is declared more than once",
                    module.id
                )));
            }
        }

        Ok(Self {
            repo_name: repo_name.to_string(),
            modules: file.buildpacks,
            groups: file.groups,
            stack_id: stack_id.to_string(),
            spec_dir: spec_dir.into(),
        })
    }

    /// Directory relative module locations are resolved against.
    pub fn spec_dir(&self) -> &Path {
        &self.spec_dir
    }
}
