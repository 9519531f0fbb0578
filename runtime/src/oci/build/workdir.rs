//! Per-build working directory.

use std::path::Path;

use bpack_core::error::{BuildError, Result};
use tempfile::TempDir;

const WORKDIR_PREFIX: &str = "create-builder";

/// Scratch directory owned by a single build.
///
/// Removed when dropped, on success and failure alike. A removal failure is
/// logged and otherwise ignored.
pub struct WorkDir {
    dir: Option<TempDir>,
}

impl WorkDir {
    /// Create a fresh working directory, under `parent` when given.
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKDIR_PREFIX);

        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| BuildError::LayerError(format!("Failed to create working directory: {}", e)))?;

        tracing::debug!(path = %dir.path().display(), "Created working directory");
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove working directory"
                );
            }
        }
    }
}
