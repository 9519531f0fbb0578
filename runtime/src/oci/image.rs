//! OCI image representation and layer append.
//!
//! An [`OciImage`] is a config document plus an ordered list of layer blobs
//! on disk. [`OciImage::append`] consumes the image and returns the next one,
//! so a build holds exactly one current image at a time.

use bpack_core::error::{BuildError, Result};
use oci_spec::image::{ImageIndex, ImageManifest};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use super::build::layer::{sha256_bytes, Layer, LAYER_MEDIA_TYPE};

const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
const CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";
const INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// A layer blob belonging to an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLayer {
    /// Path to the blob on disk
    pub path: PathBuf,
    /// Media type (kept as declared by the source manifest)
    pub media_type: String,
    /// Digest with algorithm prefix (e.g., "sha256:abc...")
    pub digest: String,
    /// Size in bytes
    pub size: u64,
}

/// An OCI image: raw config plus layers, bottom to top.
#[derive(Debug, Clone)]
pub struct OciImage {
    /// Reference the image was read as
    name: String,

    /// Image configuration document; unknown fields are preserved
    config: Value,

    /// Layers in order, bottom to top
    layers: Vec<ImageLayer>,

    /// Directory backing the layer blobs, removed once the last image
    /// derived from it is dropped
    backing: Option<Arc<TempDir>>,
}

impl OciImage {
    /// Create an image with no layers from a config document.
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            config,
            layers: Vec::new(),
            backing: None,
        }
    }

    /// Create an empty linux image for the host architecture.
    pub fn scratch(name: impl Into<String>) -> Self {
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        Self::new(
            name,
            json!({
                "architecture": arch,
                "os": "linux",
                "config": {},
                "rootfs": { "type": "layers", "diff_ids": [] },
                "history": []
            }),
        )
    }

    /// Load an OCI image from an image layout directory.
    ///
    /// The directory must contain `oci-layout`, `index.json` and
    /// `blobs/sha256/` with the manifest, config and layers.
    pub fn from_path(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let name = name.into();
        let root_dir = path.as_ref();

        Self::validate_oci_layout(root_dir)?;

        let index: ImageIndex = read_json(&root_dir.join("index.json"), &name)?;
        let manifest_digest = index
            .manifests()
            .first()
            .ok_or_else(|| BuildError::DaemonError {
                image: name.clone(),
                message: "No manifests in index.json".to_string(),
            })?
            .digest()
            .to_string();

        let manifest: ImageManifest = read_json(&blob_path(root_dir, &manifest_digest), &name)?;
        let config: Value = read_json(&blob_path(root_dir, manifest.config().digest()), &name)?;

        let layers = manifest
            .layers()
            .iter()
            .map(|layer| ImageLayer {
                path: blob_path(root_dir, layer.digest()),
                media_type: layer.media_type().to_string(),
                digest: layer.digest().to_string(),
                size: layer.size().max(0) as u64,
            })
            .collect();

        Ok(Self {
            name,
            config,
            layers,
            backing: None,
        })
    }

    /// Load an image from a layout inside `dir`, taking ownership of `dir`.
    ///
    /// The directory lives as long as this image or any image appended
    /// from it.
    pub fn from_owned_dir(name: impl Into<String>, dir: TempDir) -> Result<Self> {
        let image = Self::from_path(name, dir.path())?;
        Ok(Self {
            backing: Some(Arc::new(dir)),
            ..image
        })
    }

    /// Reference the image was read as.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image configuration document.
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Layers, bottom to top.
    pub fn layers(&self) -> &[ImageLayer] {
        &self.layers
    }

    /// Uncompressed layer digests recorded in the config.
    pub fn diff_ids(&self) -> Vec<String> {
        self.config["rootfs"]["diff_ids"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Append a layer, producing the next image.
    ///
    /// Records the layer's diff_id in `rootfs.diff_ids` and, when the config
    /// carries a history, a history entry naming the layer destination.
    pub fn append(self, layer: &Layer) -> Result<Self> {
        let Self {
            name,
            mut config,
            mut layers,
            backing,
        } = self;

        if !layer.path.is_file() {
            return Err(BuildError::DaemonError {
                image: name,
                message: format!("layer file {} does not exist", layer.path.display()),
            });
        }

        let object = match config.as_object_mut() {
            Some(object) => object,
            None => {
                return Err(BuildError::DaemonError {
                    image: name,
                    message: "image config is not a JSON object".to_string(),
                })
            }
        };

        let rootfs = object
            .entry("rootfs")
            .or_insert_with(|| json!({ "type": "layers", "diff_ids": [] }));
        match rootfs.get_mut("diff_ids").and_then(Value::as_array_mut) {
            Some(diff_ids) => diff_ids.push(json!(layer.prefixed_diff_id())),
            None => {
                return Err(BuildError::DaemonError {
                    image: name,
                    message: "image config has no rootfs.diff_ids".to_string(),
                })
            }
        }

        if let Some(history) = object.get_mut("history").and_then(Value::as_array_mut) {
            history.push(json!({ "created_by": format!("bpack: add {}", layer.target) }));
        }

        layers.push(ImageLayer {
            path: layer.path.clone(),
            media_type: LAYER_MEDIA_TYPE.to_string(),
            digest: layer.prefixed_digest(),
            size: layer.size,
        });

        Ok(Self {
            name,
            config,
            layers,
            backing,
        })
    }

    /// Write the image as an OCI image layout under `output_dir`.
    ///
    /// Returns the manifest digest (with "sha256:" prefix).
    pub fn write_layout(&self, output_dir: &Path) -> Result<String> {
        let blobs_dir = output_dir.join("blobs").join("sha256");
        std::fs::create_dir_all(&blobs_dir).map_err(|e| {
            BuildError::LayerError(format!("Failed to create output blobs dir: {}", e))
        })?;

        let mut layer_descriptors = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            let target = blob_path(output_dir, &layer.digest);
            if !target.exists() {
                std::fs::copy(&layer.path, &target).map_err(|e| {
                    BuildError::LayerError(format!(
                        "Failed to copy layer {} ({}): {}",
                        i,
                        layer.path.display(),
                        e
                    ))
                })?;
            }
            layer_descriptors.push(json!({
                "mediaType": layer.media_type,
                "digest": layer.digest,
                "size": layer.size
            }));
        }

        let config_bytes = serde_json::to_vec(&self.config)?;
        let config_digest = sha256_bytes(&config_bytes);
        write_file(&blobs_dir.join(&config_digest), &config_bytes)?;

        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST_MEDIA_TYPE,
            "config": {
                "mediaType": CONFIG_MEDIA_TYPE,
                "digest": format!("sha256:{}", config_digest),
                "size": config_bytes.len()
            },
            "layers": layer_descriptors
        });
        let manifest_bytes = serde_json::to_vec(&manifest)?;
        let manifest_digest = sha256_bytes(&manifest_bytes);
        write_file(&blobs_dir.join(&manifest_digest), &manifest_bytes)?;

        let index = json!({
            "schemaVersion": 2,
            "mediaType": INDEX_MEDIA_TYPE,
            "manifests": [{
                "mediaType": MANIFEST_MEDIA_TYPE,
                "digest": format!("sha256:{}", manifest_digest),
                "size": manifest_bytes.len()
            }]
        });
        write_file(
            &output_dir.join("index.json"),
            serde_json::to_string_pretty(&index)?.as_bytes(),
        )?;
        write_file(
            &output_dir.join("oci-layout"),
            br#"{"imageLayoutVersion":"1.0.0"}"#,
        )?;

        Ok(format!("sha256:{}", manifest_digest))
    }

    /// Validate that the directory contains a valid OCI layout.
    fn validate_oci_layout(root_dir: &Path) -> Result<()> {
        for required in ["oci-layout", "index.json", "blobs"] {
            if !root_dir.join(required).exists() {
                return Err(BuildError::NotFoundError(format!(
                    "Not a valid OCI layout: missing {} in {}",
                    required,
                    root_dir.display()
                )));
            }
        }
        Ok(())
    }
}

/// Get the path to a blob by digest.
fn blob_path(root_dir: &Path, digest: &str) -> PathBuf {
    let (algorithm, hash) = digest.split_once(':').unwrap_or(("sha256", digest));
    root_dir.join("blobs").join(algorithm).join(hash)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, image: &str) -> Result<T> {
    let content = std::fs::read(path).map_err(|e| BuildError::DaemonError {
        image: image.to_string(),
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;
    serde_json::from_slice(&content).map_err(|e| BuildError::DaemonError {
        image: image.to_string(),
        message: format!("Failed to parse {}: {}", path.display(), e),
    })
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).map_err(|e| {
        BuildError::LayerError(format!("Failed to write {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::build::layer::create_tgz;
    use std::fs;
    use tempfile::TempDir;

    fn make_layer(work: &Path, name: &str, content: &str) -> Layer {
        let src = work.join(format!("{name}-src"));
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("file.txt"), content).unwrap();
        create_tgz(&src, &format!("/{name}"), &work.join(format!("{name}.tgz")), 0, 0).unwrap()
    }

    #[test]
    fn test_scratch_image_is_empty() {
        let image = OciImage::scratch("base");
        assert_eq!(image.name(), "base");
        assert!(image.layers().is_empty());
        assert!(image.diff_ids().is_empty());
    }

    #[test]
    fn test_append_records_layer_and_diff_id() {
        let work = TempDir::new().unwrap();
        let layer = make_layer(work.path(), "one", "1");

        let image = OciImage::scratch("base").append(&layer).unwrap();

        assert_eq!(image.layers().len(), 1);
        assert_eq!(image.layers()[0].digest, layer.prefixed_digest());
        assert_eq!(image.layers()[0].media_type, LAYER_MEDIA_TYPE);
        assert_eq!(image.diff_ids(), vec![layer.prefixed_diff_id()]);
        assert_eq!(
            image.config()["history"][0]["created_by"],
            json!("bpack: add /one")
        );
    }

    #[test]
    fn test_append_preserves_order() {
        let work = TempDir::new().unwrap();
        let first = make_layer(work.path(), "first", "a");
        let second = make_layer(work.path(), "second", "b");

        let image = OciImage::scratch("base")
            .append(&first)
            .unwrap()
            .append(&second)
            .unwrap();

        let digests: Vec<&str> = image.layers().iter().map(|l| l.digest.as_str()).collect();
        assert_eq!(
            digests,
            vec![first.prefixed_digest().as_str(), second.prefixed_digest().as_str()]
        );
    }

    #[test]
    fn test_append_missing_layer_file() {
        let layer = Layer {
            path: PathBuf::from("/nonexistent/layer.tgz"),
            target: "/x".to_string(),
            digest: "abc".to_string(),
            diff_id: "def".to_string(),
            size: 1,
        };
        let err = OciImage::scratch("base").append(&layer).unwrap_err();
        assert!(matches!(err, BuildError::DaemonError { .. }));
    }

    #[test]
    fn test_append_without_history_keeps_config_shape() {
        let work = TempDir::new().unwrap();
        let layer = make_layer(work.path(), "one", "1");
        let image = OciImage::new("base", json!({ "os": "linux" }))
            .append(&layer)
            .unwrap();
        assert!(image.config().get("history").is_none());
        assert_eq!(image.diff_ids().len(), 1);
    }

    #[test]
    fn test_write_and_read_layout() {
        let work = TempDir::new().unwrap();
        let layer = make_layer(work.path(), "one", "1");
        let image = OciImage::scratch("base").append(&layer).unwrap();

        let out = work.path().join("layout");
        let digest = image.write_layout(&out).unwrap();
        assert!(digest.starts_with("sha256:"));
        assert!(out.join("oci-layout").exists());
        assert!(out.join("index.json").exists());

        let loaded = OciImage::from_path("copy", &out).unwrap();
        assert_eq!(loaded.name(), "copy");
        assert_eq!(loaded.layers().len(), 1);
        assert_eq!(loaded.layers()[0].digest, layer.prefixed_digest());
        assert!(loaded.layers()[0].path.exists());
        assert_eq!(loaded.diff_ids(), image.diff_ids());
    }

    #[test]
    fn test_write_layout_is_deterministic() {
        let work = TempDir::new().unwrap();
        let layer = make_layer(work.path(), "one", "1");
        let image = OciImage::scratch("base").append(&layer).unwrap();

        let a = image.write_layout(&work.path().join("a")).unwrap();
        let b = image.write_layout(&work.path().join("b")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_from_path_missing_layout() {
        let tmp = TempDir::new().unwrap();
        let err = OciImage::from_path("base", tmp.path()).unwrap_err();
        assert!(matches!(err, BuildError::NotFoundError(_)));
        assert!(err.to_string().contains("oci-layout"));
    }

    #[test]
    fn test_blob_path() {
        let path = blob_path(Path::new("/img"), "sha256:abc");
        assert_eq!(path, PathBuf::from("/img/blobs/sha256/abc"));
    }

    #[test]
    fn test_owned_dir_lives_with_derived_images() {
        let work = TempDir::new().unwrap();
        let owned = TempDir::new_in(work.path()).unwrap();
        let dir = owned.path().to_path_buf();
        OciImage::scratch("base").write_layout(&dir).unwrap();

        let image = OciImage::from_owned_dir("base", owned).unwrap();
        let layer = make_layer(work.path(), "one", "1");
        let derived = image.clone().append(&layer).unwrap();

        drop(image);
        assert!(dir.exists());
        derived.write_layout(&work.path().join("out")).unwrap();

        drop(derived);
        assert!(!dir.exists());
    }

    #[test]
    fn test_owned_dir_removed_on_load_failure() {
        let owned = TempDir::new().unwrap();
        let dir = owned.path().to_path_buf();
        assert!(OciImage::from_owned_dir("base", owned).is_err());
        assert!(!dir.exists());
    }
}
