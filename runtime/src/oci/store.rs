//! Disk-based OCI image store.
//!
//! Holds pulled base images and locally written builders as OCI image
//! layouts under `sha256/<digest>/`, with an in-memory index backed by a
//! persistent `index.json` file mapping references to layouts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bpack_core::error::{BuildError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Metadata for a stored image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredImage {
    /// Full image reference (e.g., "docker.io/me/builder:latest")
    pub reference: String,
    /// Manifest digest (e.g., "sha256:abc123...")
    pub digest: String,
    /// When the image was stored
    pub stored_at: DateTime<Utc>,
    /// Path to the OCI image layout on disk
    pub path: PathBuf,
}

/// Persistent index stored as JSON on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreIndex {
    images: Vec<StoredImage>,
}

/// Disk-based image store with an in-memory index.
pub struct ImageStore {
    /// Root directory for image storage
    store_dir: PathBuf,
    /// In-memory index: reference → StoredImage
    index: RwLock<HashMap<String, StoredImage>>,
}

impl ImageStore {
    /// Open (or create) an image store.
    ///
    /// Loads any existing index from disk, dropping entries whose layout
    /// directories have disappeared.
    pub fn new(store_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(store_dir).map_err(|e| {
            BuildError::LayerError(format!(
                "Failed to create image store directory {}: {}",
                store_dir.display(),
                e
            ))
        })?;

        let index = load_index(store_dir)?;
        Ok(Self {
            store_dir: store_dir.to_path_buf(),
            index: RwLock::new(index),
        })
    }

    /// Get a stored image by reference.
    pub async fn get(&self, reference: &str) -> Option<StoredImage> {
        self.index.read().await.get(reference).cloned()
    }

    /// Store an image layout from `source_dir` under `reference`.
    ///
    /// The layout is copied to `sha256/<digest>/` unless that content is
    /// already present. An existing entry for `reference` is replaced.
    pub async fn put(&self, reference: &str, digest: &str, source_dir: &Path) -> Result<StoredImage> {
        let digest_hex = digest.strip_prefix("sha256:").unwrap_or(digest);
        let target_dir = self.store_dir.join("sha256").join(digest_hex);

        if !target_dir.exists() {
            copy_dir_recursive(source_dir, &target_dir).map_err(|e| {
                BuildError::LayerError(format!(
                    "Failed to copy image {} into store: {}",
                    reference, e
                ))
            })?;
        }

        let stored = StoredImage {
            reference: reference.to_string(),
            digest: digest.to_string(),
            stored_at: Utc::now(),
            path: target_dir,
        };

        self.index
            .write()
            .await
            .insert(reference.to_string(), stored.clone());
        self.save_index().await?;

        tracing::debug!(reference = %reference, digest = %digest, "Stored image");
        Ok(stored)
    }

    /// List all stored images, sorted by reference.
    pub async fn list(&self) -> Vec<StoredImage> {
        let mut images: Vec<StoredImage> = self.index.read().await.values().cloned().collect();
        images.sort_by(|a, b| a.reference.cmp(&b.reference));
        images
    }

    /// Get the store directory path.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    async fn save_index(&self) -> Result<()> {
        let store_index = StoreIndex {
            images: self.list().await,
        };
        let data = serde_json::to_string_pretty(&store_index)?;
        let index_path = self.store_dir.join("index.json");

        tokio::fs::write(&index_path, data).await.map_err(|e| {
            BuildError::LayerError(format!(
                "Failed to write image store index {}: {}",
                index_path.display(),
                e
            ))
        })
    }
}

fn load_index(store_dir: &Path) -> Result<HashMap<String, StoredImage>> {
    let index_path = store_dir.join("index.json");
    if !index_path.exists() {
        return Ok(HashMap::new());
    }

    let data = std::fs::read_to_string(&index_path).map_err(|e| {
        BuildError::LayerError(format!(
            "Failed to read image store index {}: {}",
            index_path.display(),
            e
        ))
    })?;
    let store_index: StoreIndex = serde_json::from_str(&data).map_err(|e| {
        BuildError::SerializationError(format!("Failed to parse image store index: {}", e))
    })?;

    Ok(store_index
        .images
        .into_iter()
        .filter(|image| image.path.exists())
        .map(|image| (image.reference.clone(), image))
        .collect())
}

/// Recursively copy a directory.
fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}
