//! Builder assembler.
//!
//! Composes a builder image: the order layer on top of the base image, then
//! one layer per module in declaration order, then a single write to the
//! target repository. Nothing reaches the repository unless every layer
//! was generated and appended.

use std::path::PathBuf;

use bpack_core::error::{BuildError, Result};
use bpack_core::spec::BuildSpec;

use super::generate::{module_layer, order_layer};
use super::resolve::BuilderConfig;
use super::workdir::WorkDir;
use crate::oci::image::OciImage;
use crate::oci::repo::RepoStore;

/// Progress of a single assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Init,
    BaseResolved,
    OrderLayerApplied,
    /// Module `n` (1-based) has been appended
    ModuleLayerApplied(usize),
    Persisted,
    Done,
    Failed,
}

/// Result of a successful assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// Repository the builder was written to
    pub repo_name: String,
    /// Manifest digest reported by the repository store
    pub digest: String,
    /// Layers added on top of the base image (order layer plus modules)
    pub layer_count: usize,
}

/// Runs the create-builder pipeline.
#[derive(Debug, Clone, Default)]
pub struct BuilderAssembler {
    /// Parent for per-build working directories (system temp dir when unset)
    work_root: Option<PathBuf>,
}

impl BuilderAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create working directories under `work_root`.
    pub fn with_work_root(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: Some(work_root.into()),
        }
    }

    /// Assemble the builder described by `config` and persist it.
    pub async fn assemble(&self, config: BuilderConfig) -> Result<BuildResult> {
        let BuilderConfig {
            spec,
            base_image,
            repo,
        } = config;

        let mut phase = BuildPhase::Init;
        let result = self
            .run(&spec, base_image, repo.as_ref(), &mut phase)
            .await;

        match &result {
            Ok(built) => {
                advance(&mut phase, BuildPhase::Done);
                tracing::info!(
                    repo = %built.repo_name,
                    digest = %built.digest,
                    layers = built.layer_count,
                    "Builder image persisted"
                );
            }
            Err(e) => {
                tracing::error!(
                    repo = %spec.repo_name,
                    phase = ?phase,
                    error = %e,
                    "Builder assembly failed"
                );
                advance(&mut phase, BuildPhase::Failed);
            }
        }

        result
    }

    async fn run(
        &self,
        spec: &BuildSpec,
        base_image: Option<OciImage>,
        repo: &dyn RepoStore,
        phase: &mut BuildPhase,
    ) -> Result<BuildResult> {
        let work = WorkDir::create(self.work_root.as_deref())?;

        let base = base_image.ok_or_else(|| {
            BuildError::NotFoundError(format!(
                "base image for builder \"{}\" not found",
                spec.repo_name
            ))
        })?;
        advance(phase, BuildPhase::BaseResolved);

        let order = order_layer(work.path(), &spec.groups)
            .map_err(|e| e.context("failed to generate order.toml layer"))?;
        let image = base
            .append(&order)
            .map_err(|e| e.context("failed to append order.toml layer to image"))?;
        advance(phase, BuildPhase::OrderLayerApplied);

        let image = spec
            .modules
            .iter()
            .enumerate()
            .try_fold(image, |image, (i, module)| {
                let context = format!("buildpack \"{}\"", module.id);
                let layer = module_layer(work.path(), i + 1, module, spec.spec_dir())
                    .map_err(|e| e.context(&context))?;
                let image = image
                    .append(&layer)
                    .map_err(|e| e.context(format!("failed to append {} layer", context)))?;
                advance(phase, BuildPhase::ModuleLayerApplied(i + 1));
                Ok::<OciImage, BuildError>(image)
            })?;

        let digest = repo.write(&image).await?;
        advance(phase, BuildPhase::Persisted);

        Ok(BuildResult {
            repo_name: repo.name().to_string(),
            digest,
            layer_count: spec.modules.len() + 1,
        })
    }
}

fn advance(phase: &mut BuildPhase, next: BuildPhase) {
    tracing::debug!(from = ?phase, to = ?next, "Builder phase");
    *phase = next;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance() {
        let mut phase = BuildPhase::Init;
        advance(&mut phase, BuildPhase::BaseResolved);
        assert_eq!(phase, BuildPhase::BaseResolved);
        advance(&mut phase, BuildPhase::ModuleLayerApplied(2));
        assert_eq!(phase, BuildPhase::ModuleLayerApplied(2));
    }

    #[test]
    fn test_assembler_work_root() {
        let assembler = BuilderAssembler::with_work_root("/tmp/bpack");
        assert_eq!(assembler.work_root, Some(PathBuf::from("/tmp/bpack")));
        assert_eq!(BuilderAssembler::new().work_root, None);
    }
}
