//! Image reference parsing.
//!
//! Splits references like `gcr.io/org/builder:v1` into registry, repository,
//! tag and digest. Only the registry matters for build image selection; the
//! rest is used as the key for local stores and registry clients.

use bpack_core::error::{BuildError, Result};

/// Registry assumed when a reference names none.
pub const DEFAULT_REGISTRY: &str = "docker.io";

const DEFAULT_TAG: &str = "latest";

/// Aliases that all denote Docker Hub.
const DOCKER_HUB_ALIASES: [&str; 2] = ["index.docker.io", "registry-1.docker.io"];

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname, normalized (e.g., "gcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/ubuntu")
    pub repository: String,
    /// Tag (defaults to "latest" when neither tag nor digest is given)
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// - `ubuntu` → docker.io/library/ubuntu:latest
    /// - `me/builder` → docker.io/me/builder:latest
    /// - `localhost:5000/builder:dev` → localhost:5000/builder:dev
    /// - `gcr.io/org/img@sha256:abc` → gcr.io/org/img@sha256:abc
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(BuildError::ConfigError("Empty image reference".to_string()));
        }

        let (name_tag, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(BuildError::ConfigError(format!(
                        "Invalid digest in reference \"{}\": expected algorithm:hex",
                        reference
                    )));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A tag colon can only appear after the last slash; a colon before it
        // belongs to a registry port.
        let last_segment_start = name_tag.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_segment_start..].rfind(':') {
            Some(offset) => {
                let colon = last_segment_start + offset;
                (&name_tag[..colon], Some(name_tag[colon + 1..].to_string()))
            }
            None => (name_tag, None),
        };

        if tag.as_deref() == Some("") {
            return Err(BuildError::ConfigError(format!(
                "Empty tag in reference \"{}\"",
                reference
            )));
        }

        let (registry, repository) = split_registry(name, reference)?;
        let tag = match (&tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            _ => tag,
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Registry host of a reference, normalized.
pub fn registry_of(reference: &str) -> Result<String> {
    Ok(ImageReference::parse(reference)?.registry)
}

/// Split a name into (registry, repository).
///
/// The first component is a registry when it contains a dot or a colon, or
/// is `localhost`.
fn split_registry(name: &str, reference: &str) -> Result<(String, String)> {
    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            if rest.is_empty() {
                return Err(BuildError::ConfigError(format!(
                    "Empty repository in reference \"{}\"",
                    reference
                )));
            }
            return Ok((normalize_registry(first), rest.to_string()));
        }
        return Ok((DEFAULT_REGISTRY.to_string(), name.to_string()));
    }

    Ok((DEFAULT_REGISTRY.to_string(), format!("library/{}", name)))
}

fn normalize_registry(registry: &str) -> String {
    if DOCKER_HUB_ALIASES.contains(&registry) {
        DEFAULT_REGISTRY.to_string()
    } else {
        registry.to_string()
    }
}
