//! Module (buildpack) location resolution and `buildpack.toml` reading.

use std::path::{Path, PathBuf};

use bpack_core::error::{BuildError, Result};
use serde::Deserialize;

/// Metadata file every module directory must carry.
pub const DESCRIPTOR_FILE: &str = "buildpack.toml";

const FILE_SCHEME: &str = "file://";

/// Identity and version a module declares about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Declared identity
    pub id: String,
    /// Declared version (may be empty; callers validate)
    pub version: String,
    /// Human readable name, if any
    pub name: Option<String>,
    /// Directory the module was read from
    pub dir: PathBuf,
}

impl ModuleDescriptor {
    /// Path of the metadata file this descriptor came from.
    pub fn descriptor_path(&self) -> PathBuf {
        self.dir.join(DESCRIPTOR_FILE)
    }
}

#[derive(Debug, Deserialize)]
struct DescriptorToml {
    buildpack: BuildpackSection,
}

#[derive(Debug, Deserialize)]
struct BuildpackSection {
    #[serde(default)]
    id: String,
    #[serde(default)]
    version: String,
    name: Option<String>,
}

/// Resolve a module location to a filesystem path.
///
/// A `file://` prefix is stripped; a relative result is joined onto `spec_dir`.
pub fn resolve_location(uri: &str, spec_dir: &Path) -> PathBuf {
    let dir = Path::new(uri.strip_prefix(FILE_SCHEME).unwrap_or(uri));
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        spec_dir.join(dir)
    }
}

/// Read `buildpack.toml` from a module directory.
pub fn read_descriptor(dir: &Path) -> Result<ModuleDescriptor> {
    let path = dir.join(DESCRIPTOR_FILE);

    let content = std::fs::read_to_string(&path).map_err(|e| {
        BuildError::NotFoundError(format!(
            "reading {} from buildpack: {}: {}",
            DESCRIPTOR_FILE,
            path.display(),
            e
        ))
    })?;

    let parsed: DescriptorToml = toml::from_str(&content).map_err(|e| {
        BuildError::NotFoundError(format!(
            "reading {} from buildpack: {}: {}",
            DESCRIPTOR_FILE,
            path.display(),
            e
        ))
    })?;

    Ok(ModuleDescriptor {
        id: parsed.buildpack.id,
        version: parsed.buildpack.version,
        name: parsed.buildpack.name,
        dir: dir.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_relative_location() {
        let resolved = resolve_location("relative/path", Path::new("/specs"));
        assert_eq!(resolved, PathBuf::from("/specs/relative/path"));
    }

    #[test]
    fn test_resolve_dot_relative_location() {
        let resolved = resolve_location("./bp-java", Path::new("/specs"));
        assert_eq!(resolved, Path::new("/specs").join("./bp-java"));
    }

    #[test]
    fn test_resolve_absolute_location() {
        let resolved = resolve_location("/opt/bp", Path::new("/specs"));
        assert_eq!(resolved, PathBuf::from("/opt/bp"));
    }

    #[test]
    fn test_resolve_file_uri_ignores_spec_dir() {
        let resolved = resolve_location("file:///abs/path", Path::new("/specs"));
        assert_eq!(resolved, PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_resolve_relative_file_uri() {
        let resolved = resolve_location("file://bp-node", Path::new("/specs"));
        assert_eq!(resolved, PathBuf::from("/specs/bp-node"));
    }

    #[test]
    fn test_read_descriptor() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(DESCRIPTOR_FILE),
            "[buildpack]\nid = \"java\"\nversion = \"1.0.0\"\nname = \"Java\"\n",
        )
        .unwrap();

        let descriptor = read_descriptor(tmp.path()).unwrap();
        assert_eq!(descriptor.id, "java");
        assert_eq!(descriptor.version, "1.0.0");
        assert_eq!(descriptor.name.as_deref(), Some("Java"));
        assert_eq!(descriptor.descriptor_path(), tmp.path().join(DESCRIPTOR_FILE));
    }

    #[test]
    fn test_read_descriptor_without_version() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DESCRIPTOR_FILE), "[buildpack]\nid = \"java\"\n").unwrap();

        let descriptor = read_descriptor(tmp.path()).unwrap();
        assert_eq!(descriptor.version, "");
    }

    #[test]
    fn test_read_descriptor_missing() {
        let tmp = TempDir::new().unwrap();
        let err = read_descriptor(tmp.path()).unwrap_err();
        assert!(matches!(err, BuildError::NotFoundError(_)));
        assert!(err.to_string().contains(DESCRIPTOR_FILE));
    }

    #[test]
    fn test_read_descriptor_malformed() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DESCRIPTOR_FILE), "id = \"java\"\n").unwrap();

        let err = read_descriptor(tmp.path()).unwrap_err();
        assert!(matches!(err, BuildError::NotFoundError(_)));
    }
}
