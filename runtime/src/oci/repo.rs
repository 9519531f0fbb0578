//! Repository stores: where a finished builder image is persisted.
//!
//! A builder goes to the local image store by default, or to its remote
//! registry when publishing.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bpack_core::error::{BuildError, Result};

use super::image::OciImage;
use super::reference::ImageReference;
use super::registry::RegistryClient;
use super::store::ImageStore;

/// Destination a composed image is written to.
#[async_trait]
pub trait RepoStore: Send + Sync {
    /// Repository name the store writes to.
    fn name(&self) -> &str;

    /// Persist `image`, returning the manifest digest the destination stores.
    async fn write(&self, image: &OciImage) -> Result<String>;
}

/// Opens the repository store for a builder.
pub trait RepoStoreFactory: Send + Sync {
    /// Open a store for `repo_name`; remote when `publish` is set.
    fn open(&self, repo_name: &str, publish: bool) -> Result<Box<dyn RepoStore>>;
}

/// Writes images into the local image store.
pub struct LocalRepoStore {
    name: String,
    reference: ImageReference,
    store: Arc<ImageStore>,
}

impl LocalRepoStore {
    pub fn new(repo_name: &str, store: Arc<ImageStore>) -> Result<Self> {
        Ok(Self {
            name: repo_name.to_string(),
            reference: ImageReference::parse(repo_name)?,
            store,
        })
    }
}

#[async_trait]
impl RepoStore for LocalRepoStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, image: &OciImage) -> Result<String> {
        let store_error = |e: BuildError| BuildError::RegistryError {
            registry: "local".to_string(),
            message: format!("Failed to write {}: {}", self.reference, e),
        };

        let staging = staging_dir(Some(self.store.store_dir())).map_err(store_error)?;
        let digest = image.write_layout(staging.path()).map_err(store_error)?;
        self.store
            .put(&self.reference.full_reference(), &digest, staging.path())
            .await
            .map_err(store_error)?;

        tracing::debug!(reference = %self.reference, digest = %digest, "Wrote image to local store");
        Ok(digest)
    }
}

/// Pushes images to their registry.
pub struct RemoteRepoStore {
    name: String,
    reference: ImageReference,
    client: RegistryClient,
}

impl RemoteRepoStore {
    pub fn new(repo_name: &str) -> Result<Self> {
        Ok(Self {
            name: repo_name.to_string(),
            reference: ImageReference::parse(repo_name)?,
            client: RegistryClient::new(),
        })
    }
}

#[async_trait]
impl RepoStore for RemoteRepoStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, image: &OciImage) -> Result<String> {
        let registry = self.reference.registry.clone();
        let staging = staging_dir(None).map_err(|e| BuildError::RegistryError {
            registry: registry.clone(),
            message: e.to_string(),
        })?;
        image
            .write_layout(staging.path())
            .map_err(|e| BuildError::RegistryError {
                registry: registry.clone(),
                message: e.to_string(),
            })?;

        // The registry's digest, not the staged layout's: the manifest is
        // re-serialized on upload.
        self.client.push(&self.reference, staging.path()).await
    }
}

/// Production factory over the local image store and registry client.
pub struct ImageRepositories {
    store: Arc<ImageStore>,
}

impl ImageRepositories {
    pub fn new(store: Arc<ImageStore>) -> Self {
        Self { store }
    }
}

impl RepoStoreFactory for ImageRepositories {
    fn open(&self, repo_name: &str, publish: bool) -> Result<Box<dyn RepoStore>> {
        let store: Box<dyn RepoStore> = if publish {
            Box::new(RemoteRepoStore::new(repo_name)?)
        } else {
            Box::new(LocalRepoStore::new(repo_name, self.store.clone())?)
        };
        Ok(store)
    }
}

fn staging_dir(parent: Option<&Path>) -> Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("layout");
    let dir = match parent {
        Some(parent) => builder.tempdir_in(parent)?,
        None => builder.tempdir()?,
    };
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_write() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ImageStore::new(tmp.path()).unwrap());
        let repo = LocalRepoStore::new("me/builder", store.clone()).unwrap();
        assert_eq!(repo.name(), "me/builder");

        let digest = repo.write(&OciImage::scratch("me/builder")).await.unwrap();
        assert!(digest.starts_with("sha256:"));

        let stored = store.get("docker.io/me/builder:latest").await.unwrap();
        assert_eq!(stored.digest, digest);
        assert!(stored.path.join("index.json").exists());
    }

    #[tokio::test]
    async fn test_local_store_staging_is_cleaned() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ImageStore::new(tmp.path()).unwrap());
        let repo = LocalRepoStore::new("me/builder", store).unwrap();
        repo.write(&OciImage::scratch("me/builder")).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("layout"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_factory_selects_store() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ImageStore::new(tmp.path()).unwrap());
        let repos = ImageRepositories::new(store);

        let local = repos.open("me/builder", false).unwrap();
        assert_eq!(local.name(), "me/builder");
        let remote = repos.open("gcr.io/me/builder", true).unwrap();
        assert_eq!(remote.name(), "gcr.io/me/builder");
    }

    #[test]
    fn test_factory_rejects_invalid_name() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ImageStore::new(tmp.path()).unwrap());
        let repos = ImageRepositories::new(store);
        assert!(repos.open("me/builder:", false).is_err());
    }

    #[tokio::test]
    async fn test_remote_store_write_failure_is_registry_error() {
        let repo = RemoteRepoStore::new("localhost:1/me/builder").unwrap();
        let err = repo.write(&OciImage::scratch("me/builder")).await.unwrap_err();
        assert!(matches!(err, BuildError::RegistryError { .. }));
    }
}
