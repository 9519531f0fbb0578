//! Registry client for pulling base images and publishing builders.
//!
//! Uses the `oci-distribution` crate with anonymous access. Pulled images are
//! written as OCI image layouts; pushes read an OCI image layout back.

use std::path::Path;

use bpack_core::error::{BuildError, Result};
use oci_distribution::client::{ClientConfig, ClientProtocol, Config, ImageLayer};
use oci_distribution::manifest::{ImageIndexEntry, OciImageManifest};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};

use super::reference::ImageReference;

/// Pulls and pushes images over the registry API.
pub struct RegistryClient {
    client: Client,
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClient {
    /// Create a client that resolves image indexes to linux/<host arch>.
    pub fn new() -> Self {
        let config = ClientConfig {
            protocol: ClientProtocol::Https,
            platform_resolver: Some(Box::new(linux_platform_resolver)),
            ..Default::default()
        };
        Self {
            client: Client::new(config),
        }
    }

    /// Pull an image into `target_dir` as an OCI image layout.
    ///
    /// Returns the manifest digest.
    pub async fn pull(&self, reference: &ImageReference, target_dir: &Path) -> Result<String> {
        let oci_ref = to_oci_reference(reference)?;
        let registry = reference.registry.as_str();

        tracing::info!(
            reference = %reference,
            target = %target_dir.display(),
            "Pulling image from registry"
        );

        let blobs_dir = target_dir.join("blobs").join("sha256");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| registry_error(registry, "Failed to create blobs directory", e))?;

        let (manifest, manifest_digest) = self
            .client
            .pull_image_manifest(&oci_ref, &RegistryAuth::Anonymous)
            .await
            .map_err(|e| registry_error(registry, "Failed to pull manifest", e))?;

        let manifest_json = serde_json::to_vec(&manifest)?;
        std::fs::write(blobs_dir.join(strip_algorithm(&manifest_digest)), &manifest_json)
            .map_err(|e| registry_error(registry, "Failed to write manifest", e))?;

        for descriptor in std::iter::once(&manifest.config).chain(manifest.layers.iter()) {
            tracing::debug!(digest = %descriptor.digest, size = descriptor.size, "Pulling blob");

            let mut data: Vec<u8> = Vec::new();
            self.client
                .pull_blob(&oci_ref, descriptor, &mut data)
                .await
                .map_err(|e| {
                    registry_error(registry, &format!("Failed to pull blob {}", descriptor.digest), e)
                })?;
            std::fs::write(blobs_dir.join(strip_algorithm(&descriptor.digest)), &data)
                .map_err(|e| registry_error(registry, "Failed to write blob", e))?;
        }

        std::fs::write(
            target_dir.join("oci-layout"),
            r#"{"imageLayoutVersion":"1.0.0"}"#,
        )
        .map_err(|e| registry_error(registry, "Failed to write oci-layout", e))?;

        let index = serde_json::json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": manifest_digest,
                "size": manifest_json.len()
            }]
        });
        std::fs::write(
            target_dir.join("index.json"),
            serde_json::to_string_pretty(&index)?,
        )
        .map_err(|e| registry_error(registry, "Failed to write index.json", e))?;

        tracing::info!(reference = %reference, digest = %manifest_digest, "Image pulled");
        Ok(manifest_digest)
    }

    /// Push the OCI image layout in `image_dir` to `reference`.
    ///
    /// Returns the manifest digest as stored by the registry, which may
    /// differ from the layout's own manifest digest since the manifest is
    /// re-serialized for the upload.
    pub async fn push(&self, reference: &ImageReference, image_dir: &Path) -> Result<String> {
        let oci_ref = to_oci_reference(reference)?;
        let registry = reference.registry.as_str();

        tracing::info!(
            reference = %reference,
            source = %image_dir.display(),
            "Pushing image to registry"
        );

        let index_data = std::fs::read(image_dir.join("index.json"))
            .map_err(|e| registry_error(registry, "Failed to read index.json", e))?;
        let index: serde_json::Value = serde_json::from_slice(&index_data)?;
        let manifest_digest = index["manifests"][0]["digest"]
            .as_str()
            .ok_or_else(|| BuildError::RegistryError {
                registry: registry.to_string(),
                message: "No manifest digest in index.json".to_string(),
            })?;

        let blobs_dir = image_dir.join("blobs").join("sha256");
        let read_blob = |digest: &str| {
            std::fs::read(blobs_dir.join(strip_algorithm(digest))).map_err(|e| {
                registry_error(registry, &format!("Failed to read blob {}", digest), e)
            })
        };

        let manifest: OciImageManifest = serde_json::from_slice(&read_blob(manifest_digest)?)?;
        let config = Config::new(
            read_blob(&manifest.config.digest)?,
            manifest.config.media_type.clone(),
            None,
        );

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for descriptor in &manifest.layers {
            layers.push(ImageLayer::new(
                read_blob(&descriptor.digest)?,
                descriptor.media_type.clone(),
                None,
            ));
        }

        let response = self
            .client
            .push(
                &oci_ref,
                &layers,
                config,
                &RegistryAuth::Anonymous,
                Some(manifest),
            )
            .await
            .map_err(|e| registry_error(registry, "Failed to push image", e))?;

        let digest = self
            .client
            .fetch_manifest_digest(&oci_ref, &RegistryAuth::Anonymous)
            .await
            .map_err(|e| registry_error(registry, "Failed to fetch pushed manifest digest", e))?;

        tracing::info!(
            reference = %reference,
            manifest_url = %response.manifest_url,
            digest = %digest,
            "Image pushed"
        );

        Ok(digest)
    }
}

/// Convert an ImageReference to an oci-distribution Reference.
fn to_oci_reference(reference: &ImageReference) -> Result<Reference> {
    let ref_str = reference.full_reference();
    ref_str.parse::<Reference>().map_err(|e| {
        BuildError::ConfigError(format!("Invalid image reference \"{}\": {}", ref_str, e))
    })
}

fn strip_algorithm(digest: &str) -> &str {
    digest.strip_prefix("sha256:").unwrap_or(digest)
}

fn registry_error(registry: &str, what: &str, err: impl std::fmt::Display) -> BuildError {
    BuildError::RegistryError {
        registry: registry.to_string(),
        message: format!("{}: {}", what, err),
    }
}

/// Platform resolver selecting the linux image for the host architecture.
fn linux_platform_resolver(manifests: &[ImageIndexEntry]) -> Option<String> {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };

    manifests
        .iter()
        .find(|entry| {
            entry
                .platform
                .as_ref()
                .map_or(false, |p| p.os == "linux" && p.architecture == arch)
        })
        .map(|entry| entry.digest.clone())
}
