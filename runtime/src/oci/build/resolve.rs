//! Build spec resolution.
//!
//! Turns the create-builder flags into a [`BuilderConfig`]: the decoded
//! spec, the base image selected from the stack table and the repository
//! store the finished builder goes to.

use std::path::PathBuf;
use std::sync::Arc;

use bpack_core::config::{RegistryFallback, StackTable};
use bpack_core::error::{BuildError, Result};
use bpack_core::spec::BuildSpec;

use crate::oci::daemon::Daemon;
use crate::oci::image::OciImage;
use crate::oci::reference::registry_of;
use crate::oci::repo::{RepoStore, RepoStoreFactory};

/// Flags accepted by `create-builder`.
#[derive(Debug, Clone, Default)]
pub struct CreateBuilderFlags {
    /// Target repository name (e.g., "me/builder")
    pub repo_name: String,
    /// Path to `builder.toml`
    pub builder_config_path: PathBuf,
    /// Stack id; empty selects the default stack
    pub stack_id: String,
    /// Write to the remote registry instead of the local store
    pub publish: bool,
    /// Skip refreshing the base image
    pub no_pull: bool,
}

/// Everything the assembler needs for one build.
pub struct BuilderConfig {
    pub spec: BuildSpec,
    /// Base image; `None` when the daemon could not provide one
    pub base_image: Option<OciImage>,
    pub repo: Box<dyn RepoStore>,
}

/// Resolves flags against a stack table and the image collaborators.
pub struct BuildSpecResolver {
    stacks: StackTable,
    daemon: Arc<dyn Daemon>,
    repos: Arc<dyn RepoStoreFactory>,
}

impl BuildSpecResolver {
    pub fn new(
        stacks: StackTable,
        daemon: Arc<dyn Daemon>,
        repos: Arc<dyn RepoStoreFactory>,
    ) -> Self {
        Self {
            stacks,
            daemon,
            repos,
        }
    }

    /// Select the base image for a builder named `repo_name` on `stack_id`.
    pub fn base_image_name(&self, stack_id: &str, repo_name: &str) -> Result<String> {
        let stack = self.stacks.get(stack_id)?;
        if stack.build_images.is_empty() {
            return Err(BuildError::ConfigError(format!(
                "Invalid stack: stack \"{}\" requires at least one build image",
                stack.id
            )));
        }

        let registry = registry_of(repo_name)?;
        image_by_registry(&registry, &stack.build_images, self.stacks.registry_fallback)
    }

    /// Resolve `flags` into a builder config.
    pub async fn resolve(&self, flags: &CreateBuilderFlags) -> Result<BuilderConfig> {
        let base_image = self.base_image_name(&flags.stack_id, &flags.repo_name)?;
        tracing::debug!(
            repo = %flags.repo_name,
            base_image = %base_image,
            "Selected base image"
        );

        if !flags.no_pull && !flags.publish {
            tracing::info!(image = %base_image, "Pulling build image");
            self.daemon
                .pull_image(&base_image)
                .await
                .map_err(|e| e.context("failed to pull stack build image"))?;
        }

        let spec = BuildSpec::load(&flags.builder_config_path, &flags.repo_name, &flags.stack_id)?;

        let image = self
            .daemon
            .read_image(&base_image, !flags.publish)
            .await?
            .ok_or_else(|| {
                BuildError::NotFoundError(format!("base image \"{}\" not found", base_image))
            })?;

        let repo = self
            .repos
            .open(&flags.repo_name, flags.publish)
            .map_err(|e| e.context("failed to create repository store for builder image"))?;

        Ok(BuilderConfig {
            spec,
            base_image: Some(image),
            repo,
        })
    }
}

/// Pick the first image in `images` hosted on `registry`.
///
/// When none is, `fallback` decides between the first image and an error.
pub fn image_by_registry(
    registry: &str,
    images: &[String],
    fallback: RegistryFallback,
) -> Result<String> {
    for image in images {
        if registry_of(image)? == registry {
            return Ok(image.clone());
        }
    }

    match (fallback, images.first()) {
        (RegistryFallback::First, Some(first)) => {
            tracing::debug!(registry = %registry, image = %first, "No build image on registry, using first");
            Ok(first.clone())
        }
        _ => Err(BuildError::ConfigError(format!(
            "Invalid stack: no build image found for registry \"{}\"",
            registry
        ))),
    }
}
