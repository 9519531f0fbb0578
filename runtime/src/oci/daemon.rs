//! Daemon - the image source a build reads its base image from.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bpack_core::error::{BuildError, Result};

use super::image::OciImage;
use super::reference::ImageReference;
use super::registry::RegistryClient;
use super::store::ImageStore;

/// Image source used by the spec resolver.
#[async_trait]
pub trait Daemon: Send + Sync {
    /// Refresh the local copy of `reference` from its registry.
    async fn pull_image(&self, reference: &str) -> Result<()>;

    /// Read an image, from the local store when `use_local` is set,
    /// otherwise straight from the registry.
    ///
    /// Returns `Ok(None)` when a local image is absent.
    async fn read_image(&self, reference: &str, use_local: bool) -> Result<Option<OciImage>>;
}

/// Daemon backed by the local image store and the registry client.
pub struct LocalDaemon {
    store: Arc<ImageStore>,
    client: RegistryClient,
}

impl LocalDaemon {
    /// Create a daemon over `store`.
    pub fn new(store: Arc<ImageStore>) -> Self {
        Self {
            store,
            client: RegistryClient::new(),
        }
    }

    /// Directory remote reads are materialized under.
    fn remote_root(&self) -> PathBuf {
        self.store.store_dir().join("remote")
    }
}

#[async_trait]
impl Daemon for LocalDaemon {
    async fn pull_image(&self, reference: &str) -> Result<()> {
        let parsed = ImageReference::parse(reference)?;
        let daemon_error = |e: BuildError| BuildError::DaemonError {
            image: reference.to_string(),
            message: e.to_string(),
        };

        let staging_root = self.store.store_dir().join("tmp");
        std::fs::create_dir_all(&staging_root).map_err(|e| daemon_error(e.into()))?;
        let staging = tempfile::Builder::new()
            .prefix("pull")
            .tempdir_in(&staging_root)
            .map_err(|e| daemon_error(e.into()))?;

        let digest = self
            .client
            .pull(&parsed, staging.path())
            .await
            .map_err(daemon_error)?;
        self.store
            .put(&parsed.full_reference(), &digest, staging.path())
            .await
            .map_err(daemon_error)?;

        Ok(())
    }

    async fn read_image(&self, reference: &str, use_local: bool) -> Result<Option<OciImage>> {
        let parsed = ImageReference::parse(reference)?;

        if use_local {
            return match self.store.get(&parsed.full_reference()).await {
                Some(stored) => Ok(Some(OciImage::from_path(reference, &stored.path)?)),
                None => {
                    tracing::debug!(reference = %parsed, "Image not in local store");
                    Ok(None)
                }
            };
        }

        // The pulled layout belongs to the returned image and is removed
        // with it; remote reads never touch the local index.
        let daemon_error = |e: BuildError| BuildError::DaemonError {
            image: reference.to_string(),
            message: e.to_string(),
        };
        let remote_root = self.remote_root();
        std::fs::create_dir_all(&remote_root).map_err(|e| daemon_error(e.into()))?;
        let target = tempfile::Builder::new()
            .prefix("read")
            .tempdir_in(&remote_root)
            .map_err(|e| daemon_error(e.into()))?;

        self.client
            .pull(&parsed, target.path())
            .await
            .map_err(daemon_error)?;

        Ok(Some(OciImage::from_owned_dir(reference, target)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_local_image_absent() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ImageStore::new(tmp.path()).unwrap());
        let daemon = LocalDaemon::new(store);
        assert!(daemon.read_image("packs/build", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_local_image_present() {
        let tmp = TempDir::new().unwrap();
        let layout = tmp.path().join("layout");
        let digest = OciImage::scratch("packs/build").write_layout(&layout).unwrap();

        let store = Arc::new(ImageStore::new(&tmp.path().join("store")).unwrap());
        store
            .put("docker.io/packs/build:latest", &digest, &layout)
            .await
            .unwrap();

        let daemon = LocalDaemon::new(store);
        let image = daemon.read_image("packs/build", true).await.unwrap().unwrap();
        assert_eq!(image.name(), "packs/build");
        assert!(image.layers().is_empty());
    }

    #[tokio::test]
    async fn test_read_image_invalid_reference() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ImageStore::new(tmp.path()).unwrap());
        let daemon = LocalDaemon::new(store);
        let err = daemon.read_image("", true).await.unwrap_err();
        assert!(matches!(err, BuildError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_failed_remote_read_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ImageStore::new(tmp.path()).unwrap());
        let daemon = LocalDaemon::new(store.clone());

        let err = daemon
            .read_image("localhost:1/packs/build", false)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::DaemonError { .. }));
        assert_eq!(std::fs::read_dir(tmp.path().join("remote")).unwrap().count(), 0);
        assert!(store.list().await.is_empty());
    }
}
